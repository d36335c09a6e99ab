/// Weights of the 5x5 Laplacian edge kernel, row-major, centred at (2, 2).
pub const LAPLACE_5X5: [[i32; 5]; 5] = [
    [0, 0, -1, 0, 0],
    [0, -1, -2, -1, 0],
    [-1, -2, 16, -2, -1],
    [0, -1, -2, -1, 0],
    [0, 0, -1, 0, 0],
];

/// Read-only 5x5 convolution kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kernel {
    weights: [[i32; 5]; 5],
}

static LAPLACE: Kernel = Kernel {
    weights: LAPLACE_5X5,
};

impl Kernel {
    pub const RADIUS: usize = 2;
    pub const SIZE: usize = 5;

    /// The process-wide edge-detection kernel.
    pub fn laplace() -> &'static Kernel {
        &LAPLACE
    }

    pub const fn from_weights(weights: [[i32; 5]; 5]) -> Self {
        Self { weights }
    }

    /// Weight at offset `(dy, dx)` from the centre, both in `[-2, 2]`.
    #[inline]
    pub fn at(&self, dy: i32, dx: i32) -> i32 {
        debug_assert!((-2..=2).contains(&dy) && (-2..=2).contains(&dx));
        self.weights[(dy + 2) as usize][(dx + 2) as usize]
    }

    pub fn weights(&self) -> &[[i32; 5]; 5] {
        &self.weights
    }

    pub fn sum(&self) -> i32 {
        self.weights.iter().flatten().sum()
    }
}
