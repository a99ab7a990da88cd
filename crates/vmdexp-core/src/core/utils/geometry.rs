use nalgebra::{Rotation3, Unit, Vector3};
use serde_json::Value;

pub fn vector_from_value(value: &Value) -> Option<Vector3<f64>> {
    let items = value.as_array()?;
    if items.len() != 3 {
        return None;
    }
    Some(Vector3::new(
        items[0].as_f64()?,
        items[1].as_f64()?,
        items[2].as_f64()?,
    ))
}

pub fn vector_to_value(v: &Vector3<f64>) -> Value {
    Value::from(vec![v.x, v.y, v.z])
}

/// Mass-weighted center of `(position, mass)` pairs.
///
/// Returns `None` for an empty input or a non-positive total mass.
pub fn center_of_mass(points: &[(Vector3<f64>, f64)]) -> Option<Vector3<f64>> {
    let total: f64 = points.iter().map(|(_, m)| m).sum();
    if points.is_empty() || total <= 0.0 {
        return None;
    }
    let weighted = points
        .iter()
        .fold(Vector3::zeros(), |acc, (p, m)| acc + p * *m);
    Some(weighted / total)
}

/// Rotation of `angle` radians about `axis`; `None` for a zero axis.
pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Option<Rotation3<f64>> {
    Unit::try_new(*axis, f64::EPSILON).map(|axis| Rotation3::from_axis_angle(&axis, angle))
}

pub fn rotate_about(point: &Vector3<f64>, center: &Vector3<f64>, rotation: &Rotation3<f64>) -> Vector3<f64> {
    center + rotation * (point - center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_close(a: &Vector3<f64>, b: &Vector3<f64>) {
        assert!((a - b).norm() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[test]
    fn center_of_mass_weights_by_mass() {
        let com = center_of_mass(&[(Vector3::new(0.0, 0.0, 0.0), 1.0), (Vector3::new(4.0, 0.0, 0.0), 3.0)]).unwrap();
        assert_close(&com, &Vector3::new(3.0, 0.0, 0.0));
        assert!(center_of_mass(&[]).is_none());
    }

    #[test]
    fn rotation_about_a_center() {
        let rotation = rotation_from_axis_angle(&Vector3::z(), FRAC_PI_2).unwrap();
        let rotated = rotate_about(&Vector3::new(2.0, 1.0, 0.0), &Vector3::new(1.0, 1.0, 0.0), &rotation);
        assert_close(&rotated, &Vector3::new(1.0, 2.0, 0.0));
        assert!(rotation_from_axis_angle(&Vector3::zeros(), 1.0).is_none());
    }

    #[test]
    fn value_conversion_requires_three_numbers() {
        let v = Vector3::new(1.0, -2.0, 0.5);
        assert_eq!(vector_from_value(&vector_to_value(&v)), Some(v));
        assert_eq!(vector_from_value(&serde_json::json!([1, 2])), None);
    }
}
