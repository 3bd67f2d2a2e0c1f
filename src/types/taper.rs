use ndarray::prelude::*;

/// Separable 2-D prolate spheroidal taper, shape (`size`, `size`).
pub type Taper = Array2<f64>;

pub trait TaperExtension {
    fn generate(size: usize) -> Self;
}

impl TaperExtension for Taper {
    /// Sample the spheroidal function on `size` points across [-1, 1] in
    /// each direction. The edge samples are zero.
    fn generate(size: usize) -> Self {
        let spheroidal =
            Array1::linspace(-1.0, 1.0, size).mapv(|x: f64| evaluate_spheroidal(x.abs()));

        let mat_1n = spheroidal
            .to_shape((1, spheroidal.len()))
            .expect("1D array should fit in 1xN matrix.")
            .to_owned();
        let mat_n1 = mat_1n.clone().reversed_axes();

        &mat_1n * &mat_n1
    }
}

/// Prolate spheroidal wave function (support 6, alpha 1) times (1 - x^2),
/// for 0 <= x <= 1. Zero outside that range.
pub fn evaluate_spheroidal(x: f64) -> f64 {
    #[rustfmt::skip]
    let p: [[f64; 5]; 2] = [
        [8.203343e-2, -3.644705e-1, 6.278660e-1, -5.335581e-1, 2.312756e-1],
        [4.028559e-3, -3.697768e-2, 1.021332e-1, -1.201436e-1, 6.412774e-2],
    ];
    #[rustfmt::skip]
    let q: [[f64; 3]; 2] = [
        [1.0000000e0, 8.212018e-1, 2.078043e-1],
        [1.0000000e0, 9.599102e-1, 2.918724e-1],
    ];

    let (part, end): (usize, f64) = match x {
        0.0..0.75 => (0, 0.75),
        0.75..=1.0 => (1, 1.0),
        _ => return 0.0,
    };

    let x_squared = x.powi(2);
    let del_x_squared = x_squared - end.powi(2);
    let top = evaluate_polynomial(&p[part], del_x_squared);
    let btm = evaluate_polynomial(&q[part], del_x_squared);

    if btm == 0.0 {
        0.0
    } else {
        (1.0 - x_squared) * (top / btm)
    }
}

fn evaluate_polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn spheroidal_peaks_at_centre() {
        assert_abs_diff_eq!(evaluate_spheroidal(0.0), 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(evaluate_spheroidal(1.0), 0.0);
        assert_eq!(evaluate_spheroidal(1.5), 0.0);
        assert!(evaluate_spheroidal(0.5) < evaluate_spheroidal(0.25));
        // Both polynomial pieces meet at 0.75
        assert_abs_diff_eq!(
            evaluate_spheroidal(0.749_999_9),
            evaluate_spheroidal(0.75),
            epsilon = 1e-4
        );
    }

    #[test]
    fn taper_is_symmetric_with_zero_edges() {
        let taper = Taper::generate(7);
        assert_eq!(taper.dim(), (7, 7));
        assert_abs_diff_eq!(taper[(0, 3)], 0.0);
        assert_abs_diff_eq!(taper[(3, 3)], 1.0, epsilon = 2e-3);
        assert_abs_diff_eq!(taper[(1, 2)], taper[(2, 1)], epsilon = 1e-12);
        assert_abs_diff_eq!(taper[(1, 2)], taper[(5, 4)], epsilon = 1e-12);
    }
}
