use ndarray::{Array2, ArrayView2, Zip};

// ---------------------------------------------------------------------------
// Composite mask: which grid cells survive for one (model, window)
// ---------------------------------------------------------------------------

/// Union of invalidity indicators. `true` marks a cell that is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeMask {
    mask: Array2<bool>,
}

impl CompositeMask {
    /// Start from a grid where every cell is valid.
    pub fn all_valid(shape: (usize, usize)) -> Self {
        CompositeMask {
            mask: Array2::from_elem(shape, false),
        }
    }

    /// OR another mask of the same shape into this one.
    ///
    /// # Panics
    /// If the shapes differ; callers check grid agreement beforehand.
    pub fn exclude(&mut self, other: ArrayView2<'_, bool>) {
        Zip::from(&mut self.mask)
            .and(&other)
            .for_each(|m, &o| *m |= o);
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.mask.view()
    }

    /// Number of cells left after compression.
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&m| !m).count()
    }
}

/// Drop every masked cell, keeping row-major order of the rest.
pub fn compress<T: Copy>(grid: ArrayView2<'_, T>, mask: &CompositeMask) -> Vec<T> {
    debug_assert_eq!(grid.dim(), mask.shape());
    grid.iter()
        .zip(mask.mask.iter())
        .filter(|&(_, &m)| !m)
        .map(|(&v, _)| v)
        .collect()
}
