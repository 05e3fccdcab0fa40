//! Row-parallel iteration that degrades to plain iterators.
//!
//! With the `parallel` feature the rayon prelude is re-exported. Without it,
//! `into_par_iter()` is provided for every `IntoIterator` and simply returns
//! the sequential iterator, so `.map()`/`.flat_map()`/`.collect()` chains
//! compile unchanged.
#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
