//! Cubic Hermite evaluation, arc length, curvature, and derivative smoothing.
//!
//! All curves are single cubic segments parameterised by `xi ∈ [0, 1]`
//! between two end values with end derivatives (per unit `xi`). Chains of
//! segments share their end derivatives, which is how rings and centerlines
//! are represented throughout the pipeline.

use crate::{try_normalize, Point3, Vec3};

/// Gauss–Legendre abscissae and weights on `[0, 1]` (5 points).
const GAUSS_XI: [f64; 5] = [
    0.046_910_077_030_668,
    0.230_765_344_947_158,
    0.5,
    0.769_234_655_052_842,
    0.953_089_922_969_332,
];
const GAUSS_WEIGHTS: [f64; 5] = [
    0.118_463_442_528_095,
    0.239_314_335_249_683,
    0.284_444_444_444_444,
    0.239_314_335_249_683,
    0.118_463_442_528_095,
];

fn basis(xi: f64) -> [f64; 4] {
    let xi2 = xi * xi;
    let xi3 = xi2 * xi;
    [
        2.0 * xi3 - 3.0 * xi2 + 1.0,
        xi3 - 2.0 * xi2 + xi,
        -2.0 * xi3 + 3.0 * xi2,
        xi3 - xi2,
    ]
}

fn basis_d1(xi: f64) -> [f64; 4] {
    let xi2 = xi * xi;
    [
        6.0 * xi2 - 6.0 * xi,
        3.0 * xi2 - 4.0 * xi + 1.0,
        -6.0 * xi2 + 6.0 * xi,
        3.0 * xi2 - 2.0 * xi,
    ]
}

fn basis_d2(xi: f64) -> [f64; 4] {
    [
        12.0 * xi - 6.0,
        6.0 * xi - 4.0,
        -12.0 * xi + 6.0,
        6.0 * xi - 2.0,
    ]
}

fn combine(b: [f64; 4], v1: &Vec3, d1: &Vec3, v2: &Vec3, d2: &Vec3) -> Vec3 {
    b[0] * v1 + b[1] * d1 + b[2] * v2 + b[3] * d2
}

/// Interpolate a vector-valued Hermite segment at `xi`.
pub fn interpolate_vec(v1: &Vec3, d1: &Vec3, v2: &Vec3, d2: &Vec3, xi: f64) -> Vec3 {
    combine(basis(xi), v1, d1, v2, d2)
}

/// Point on the Hermite segment at `xi`.
pub fn interpolate(v1: &Point3, d1: &Vec3, v2: &Point3, d2: &Vec3, xi: f64) -> Point3 {
    Point3::from(interpolate_vec(&v1.coords, d1, &v2.coords, d2, xi))
}

/// First derivative with respect to `xi`.
pub fn derivative(v1: &Point3, d1: &Vec3, v2: &Point3, d2: &Vec3, xi: f64) -> Vec3 {
    combine(basis_d1(xi), &v1.coords, d1, &v2.coords, d2)
}

/// Second derivative with respect to `xi`.
pub fn second_derivative(v1: &Point3, d1: &Vec3, v2: &Point3, d2: &Vec3, xi: f64) -> Vec3 {
    combine(basis_d2(xi), &v1.coords, d1, &v2.coords, d2)
}

/// Scalar Hermite interpolation.
pub fn interpolate_scalar(v1: f64, d1: f64, v2: f64, d2: f64, xi: f64) -> f64 {
    let b = basis(xi);
    b[0] * v1 + b[1] * d1 + b[2] * v2 + b[3] * d2
}

/// Scalar Hermite derivative with respect to `xi`.
pub fn derivative_scalar(v1: f64, d1: f64, v2: f64, d2: f64, xi: f64) -> f64 {
    let b = basis_d1(xi);
    b[0] * v1 + b[1] * d1 + b[2] * v2 + b[3] * d2
}

/// Arc length of the segment by 5-point Gauss–Legendre quadrature.
pub fn arc_length(v1: &Point3, d1: &Vec3, v2: &Point3, d2: &Vec3) -> f64 {
    GAUSS_XI
        .iter()
        .zip(GAUSS_WEIGHTS.iter())
        .map(|(&xi, &w)| w * derivative(v1, d1, v2, d2, xi).norm())
        .sum()
}

/// Signed curvature of the segment at `xi`.
///
/// The magnitude is `|x' × x''| / |x'|³`. The sign is positive when the
/// centre of curvature lies on the opposite side of `radial` (the curve
/// bends away from it), negative when it lies on the same side. A
/// degenerate derivative gives zero.
pub fn curvature(v1: &Point3, d1: &Vec3, v2: &Point3, d2: &Vec3, radial: &Vec3, xi: f64) -> f64 {
    let dx = derivative(v1, d1, v2, d2, xi);
    let ddx = second_derivative(v1, d1, v2, d2, xi);
    let speed = dx.norm();
    if speed < crate::ZERO_LENGTH {
        return 0.0;
    }
    let magnitude = dx.cross(&ddx).norm() / (speed * speed * speed);
    let towards_centre = ddx - (ddx.dot(&dx) / (speed * speed)) * dx;
    if towards_centre.dot(radial) > 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Derivative at the first node of the quadratic through `v1`, `v2` that
/// has derivative `d2` at `v2`.
pub fn lagrange_start_derivative(v1: &Point3, v2: &Point3, d2: &Vec3) -> Vec3 {
    2.0 * (v2 - v1) - d2
}

/// Derivative at the last node of the quadratic through `v1`, `v2` that
/// has derivative `d1` at `v1`.
pub fn lagrange_end_derivative(v1: &Point3, d1: &Vec3, v2: &Point3) -> Vec3 {
    2.0 * (v2 - v1) - d1
}

/// Options for [`smooth_derivatives_line`].
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Keep every derivative's direction and only resize it.
    pub fix_all_directions: bool,
    /// Leave the first derivative untouched.
    pub fix_start_derivative: bool,
    /// Leave the last derivative untouched.
    pub fix_end_derivative: bool,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Convergence threshold relative to the mean segment arc length.
    pub tolerance: f64,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            fix_all_directions: false,
            fix_start_derivative: false,
            fix_end_derivative: false,
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl SmoothOptions {
    /// Both end derivatives fixed, interior derivatives free.
    pub fn fixed_ends() -> Self {
        Self {
            fix_start_derivative: true,
            fix_end_derivative: true,
            ..Self::default()
        }
    }
}

/// Smooth the derivatives of a Hermite chain through `points`.
///
/// Interior derivatives take the direction bisecting the adjacent chords
/// and a magnitude equal to the mean of the adjacent segment arc lengths.
/// Free end derivatives come from the quadratic through the end segment,
/// sized to its arc length. Iterates until the largest change falls below
/// `tolerance` times the mean arc length.
///
/// Fixed derivatives are returned unchanged. Fewer than two points are
/// returned as given.
pub fn smooth_derivatives_line(
    points: &[Point3],
    derivatives: &[Vec3],
    options: &SmoothOptions,
) -> Vec<Vec3> {
    let n = points.len();
    let mut md = derivatives.to_vec();
    if n < 2 || derivatives.len() != n {
        return md;
    }
    let last = n - 1;

    for _ in 0..options.max_iterations {
        let lengths: Vec<f64> = (0..last)
            .map(|i| arc_length(&points[i], &md[i], &points[i + 1], &md[i + 1]))
            .collect();
        let mean_length = lengths.iter().sum::<f64>() / lengths.len() as f64;

        let mut next = md.clone();
        for i in 1..last {
            let direction = if options.fix_all_directions {
                try_normalize(&md[i])
            } else {
                let back = try_normalize(&(points[i] - points[i - 1]));
                let ahead = try_normalize(&(points[i + 1] - points[i]));
                match (back, ahead) {
                    (Some(b), Some(a)) => try_normalize(&(a + b)).or(Some(a)),
                    (b, a) => a.or(b),
                }
            };
            if let Some(direction) = direction {
                next[i] = direction * 0.5 * (lengths[i - 1] + lengths[i]);
            }
        }

        if !options.fix_start_derivative {
            let guess = if n == 2 && !options.fix_end_derivative {
                points[1] - points[0]
            } else {
                lagrange_start_derivative(&points[0], &points[1], &next[1])
            };
            let direction = if options.fix_all_directions {
                try_normalize(&md[0])
            } else {
                try_normalize(&guess)
            };
            if let Some(direction) = direction {
                next[0] = direction * lengths[0];
            }
        }

        if !options.fix_end_derivative {
            let guess = if n == 2 && !options.fix_start_derivative {
                points[1] - points[0]
            } else {
                lagrange_end_derivative(&points[last - 1], &next[last - 1], &points[last])
            };
            let direction = if options.fix_all_directions {
                try_normalize(&md[last])
            } else {
                try_normalize(&guess)
            };
            if let Some(direction) = direction {
                next[last] = direction * lengths[last - 1];
            }
        }

        let change = md
            .iter()
            .zip(next.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        md = next;
        if change <= options.tolerance * mean_length.max(crate::ZERO_LENGTH) {
            break;
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn quarter_circle() -> (Point3, Vec3, Point3, Vec3) {
        let k = 4.0 * (PI / 8.0).tan();
        (
            Point3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, k, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Vec3::new(-k, 0.0, 0.0),
        )
    }

    #[test]
    fn test_interpolate_endpoints() {
        let (v1, d1, v2, d2) = quarter_circle();
        assert!((interpolate(&v1, &d1, &v2, &d2, 0.0) - v1).norm() < 1e-12);
        assert!((interpolate(&v1, &d1, &v2, &d2, 1.0) - v2).norm() < 1e-12);
        assert!((derivative(&v1, &d1, &v2, &d2, 0.0) - d1).norm() < 1e-12);
        assert!((derivative(&v1, &d1, &v2, &d2, 1.0) - d2).norm() < 1e-12);
    }

    #[test]
    fn test_straight_segment_is_linear() {
        let v1 = Point3::origin();
        let v2 = Point3::new(0.0, 0.0, 0.1);
        let d = Vec3::new(0.0, 0.0, 0.1);
        let mid = interpolate(&v1, &d, &v2, &d, 0.5);
        assert_relative_eq!(mid.z, 0.05, epsilon = 1e-12);
        assert_relative_eq!(arc_length(&v1, &d, &v2, &d), 0.1, epsilon = 1e-12);
        assert_eq!(curvature(&v1, &d, &v2, &d, &Vec3::x(), 0.3), 0.0);
    }

    #[test]
    fn test_quarter_circle_length_and_curvature() {
        let (v1, d1, v2, d2) = quarter_circle();
        assert_relative_eq!(arc_length(&v1, &d1, &v2, &d2), PI / 2.0, epsilon = 1e-3);

        // Outward radial at the midpoint: centre lies opposite, so positive.
        let mid = interpolate(&v1, &d1, &v2, &d2, 0.5);
        let k = curvature(&v1, &d1, &v2, &d2, &mid.coords, 0.5);
        assert_relative_eq!(k, 1.0, epsilon = 0.02);
        let k_in = curvature(&v1, &d1, &v2, &d2, &(-mid.coords), 0.5);
        assert_relative_eq!(k_in, -k, epsilon = 1e-12);
    }

    #[test]
    fn test_scalar_interpolation() {
        assert_relative_eq!(interpolate_scalar(1.0, 0.0, 2.0, 0.0, 0.5), 1.5);
        assert_relative_eq!(interpolate_scalar(1.0, 1.0, 2.0, 1.0, 0.25), 1.25);
        assert_relative_eq!(derivative_scalar(1.0, 1.0, 2.0, 1.0, 0.7), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lagrange_derivatives_on_line() {
        let v1 = Point3::origin();
        let v2 = Point3::new(2.0, 0.0, 0.0);
        let d = Vec3::new(2.0, 0.0, 0.0);
        assert!((lagrange_start_derivative(&v1, &v2, &d) - d).norm() < 1e-12);
        assert!((lagrange_end_derivative(&v1, &d, &v2) - d).norm() < 1e-12);
    }

    #[test]
    fn test_smooth_uneven_line() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ];
        let derivatives = vec![Vec3::x(); 3];
        let smoothed = smooth_derivatives_line(&points, &derivatives, &SmoothOptions::default());
        // Every derivative stays along +x.
        for d in &smoothed {
            assert!(d.y.abs() < 1e-12 && d.z.abs() < 1e-12);
            assert!(d.x > 0.0);
        }
        // Interior magnitude is the mean of the adjacent spans.
        assert_relative_eq!(smoothed[1].x, 1.5, epsilon = 1e-3);
    }

    #[test]
    fn test_smooth_fixed_ends_untouched() {
        let points = vec![
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 0.5, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        let d0 = Vec3::new(1.0, 1.0, 0.0);
        let d2 = Vec3::new(1.0, -1.0, 0.0);
        let smoothed = smooth_derivatives_line(
            &points,
            &[d0, Vec3::zeros(), d2],
            &SmoothOptions::fixed_ends(),
        );
        assert_eq!(smoothed[0], d0);
        assert_eq!(smoothed[2], d2);
        // Symmetric chain: middle derivative is horizontal.
        assert!(smoothed[1].y.abs() < 1e-9);
        assert!(smoothed[1].x > 0.5);
    }

    #[test]
    fn test_smooth_fix_all_directions_keeps_direction() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.2, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let dirs = vec![Vec3::new(1.0, 0.5, 0.0), Vec3::x(), Vec3::new(1.0, -0.5, 0.0)];
        let options = SmoothOptions {
            fix_all_directions: true,
            ..SmoothOptions::default()
        };
        let smoothed = smooth_derivatives_line(&points, &dirs, &options);
        for (s, d) in smoothed.iter().zip(dirs.iter()) {
            assert!(s.normalize().dot(&d.normalize()) > 1.0 - 1e-12);
        }
    }
}
