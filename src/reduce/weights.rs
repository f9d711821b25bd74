use ndarray::{ArrayD, ArrayViewD, IxDyn, Zip};

use super::ReduceError;
use crate::readers::DatasetHeader;

/// Accepted latitude coordinate names, in priority order.
pub const LATITUDE_NAMES: [&str; 2] = ["lat", "latitude"];

pub fn latitude_name(header: &DatasetHeader) -> Result<&'static str, ReduceError> {
    LATITUDE_NAMES
        .into_iter()
        .find(|name| header.coordinate(name).is_some())
        .ok_or(ReduceError::MissingLatitude)
}

/// `cos(lat)` normalized so the weights average to exactly one. NaN
/// latitudes are ignored by the mean and stay NaN.
pub fn latitude_weights(lat: &ArrayD<f64>) -> Result<ArrayD<f64>, ReduceError> {
    let weights = lat.mapv(|phi| phi.to_radians().cos());
    let mean = nanmean(weights.iter().copied());

    if !mean.is_finite() || mean == 0.0 {
        return Err(ReduceError::NoValidWeights);
    }

    Ok(weights / mean)
}

/// Lays `weights` out on the target dims so it can be multiplied
/// element-wise with a spatial slab. Target dims absent from the weights are
/// repeated.
pub fn broadcast_weights(
    weights: &ArrayD<f64>,
    weight_dims: &[String],
    target_dims: &[String],
    target_shape: &[usize],
) -> Result<ArrayD<f64>, ReduceError> {
    let positions = weight_dims
        .iter()
        .zip(weights.shape())
        .map(|(dim, &len)| {
            let pos = target_dims
                .iter()
                .position(|t| t == dim)
                .ok_or_else(|| {
                    ReduceError::WeightDims(format!("'{}' is not a spatial dimension", dim))
                })?;
            if target_shape[pos] != len {
                return Err(ReduceError::WeightDims(format!(
                    "'{}' has {} weights for {} cells",
                    dim, len, target_shape[pos]
                )));
            }
            Ok(pos)
        })
        .collect::<Result<Vec<usize>, ReduceError>>()?;

    let mut weight_index = vec![0; positions.len()];
    Ok(ArrayD::from_shape_fn(IxDyn(target_shape), |idx| {
        for (slot, &pos) in weight_index.iter_mut().zip(&positions) {
            *slot = idx[pos];
        }
        weights[weight_index.as_slice()]
    }))
}

/// Mean of `values * weights` over every element, skipping NaN products.
pub fn weighted_mean(values: &ArrayViewD<f64>, weights: &ArrayViewD<f64>) -> f64 {
    let (sum, count) = Zip::from(values)
        .and(weights)
        .fold((0.0, 0usize), |(sum, count), &v, &w| {
            let product = v * w;
            if product.is_nan() {
                (sum, count)
            } else {
                (sum + product, count + 1)
            }
        });

    if count == 0 { f64::NAN } else { sum / count as f64 }
}

pub fn nanmean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 { f64::NAN } else { sum / count as f64 }
}
