use nalgebra::{Matrix3, Point3, Vector3};

pub fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f64)
}

pub fn center_of_mass(points: &[Point3<f64>], masses: &[f64]) -> Point3<f64> {
    let total_mass: f64 = masses.iter().sum();
    if points.is_empty() || total_mass <= 0.0 {
        return centroid(points);
    }
    let weighted = points
        .iter()
        .zip(masses)
        .fold(Vector3::zeros(), |acc, (p, m)| acc + p.coords * *m);
    Point3::from(weighted / total_mass)
}

/// Mass-weighted radius of gyration.
pub fn radius_of_gyration(points: &[Point3<f64>], masses: &[f64]) -> f64 {
    let total_mass: f64 = masses.iter().sum();
    if points.is_empty() || total_mass <= 0.0 {
        return 0.0;
    }
    let com = center_of_mass(points, masses);
    let weighted_sq: f64 = points
        .iter()
        .zip(masses)
        .map(|(p, m)| m * (p - com).norm_squared())
        .sum();
    (weighted_sq / total_mass).sqrt()
}

/// Optimally rotates and translates `mobile` onto `reference` (Kabsch algorithm) and
/// returns the superposed coordinates.
pub fn superpose(reference: &[Point3<f64>], mobile: &[Point3<f64>]) -> Vec<Point3<f64>> {
    let ref_center = centroid(reference);
    let mob_center = centroid(mobile);

    let mut covariance = Matrix3::zeros();
    for (p, q) in mobile.iter().zip(reference) {
        covariance += (p - mob_center) * (q - ref_center).transpose();
    }

    let svd = covariance.svd(true, true);
    let rotation = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let v = v_t.transpose();
            let d = (v * u.transpose()).determinant().signum();
            let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d));
            v * correction * u.transpose()
        }
        _ => Matrix3::identity(),
    };

    mobile
        .iter()
        .map(|p| ref_center + rotation * (p - mob_center))
        .collect()
}

pub fn rmsd(a: &[Point3<f64>], b: &[Point3<f64>]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = a.iter().zip(b).map(|(p, q)| (p - q).norm_squared()).sum();
    (sum_sq / a.len() as f64).sqrt()
}

/// Per-atom root-mean-square fluctuation around the mean position over all frames.
pub fn rmsf(frames: &[Vec<Point3<f64>>]) -> Vec<f64> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let n_frames = frames.len() as f64;
    let mut mean = vec![Vector3::zeros(); first.len()];
    for frame in frames {
        for (acc, p) in mean.iter_mut().zip(frame) {
            *acc += p.coords;
        }
    }
    for acc in &mut mean {
        *acc /= n_frames;
    }

    let mut fluct = vec![0.0; first.len()];
    for frame in frames {
        for ((f, p), m) in fluct.iter_mut().zip(frame).zip(&mean) {
            *f += (p.coords - m).norm_squared();
        }
    }
    fluct.into_iter().map(|f| (f / n_frames).sqrt()).collect()
}
