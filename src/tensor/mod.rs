//! Tensor primitives: an owning-or-shallow float buffer and the strongly
//! shaped facades (`Vector`, `Matrix`, `Array2`, `Array3`, `Kernel`) layered
//! over it.
//!
//! Storage order is row-major for 2-D and `(x + y*W + z*W*H)` for 3-D; this
//! ordering is load-bearing for GPU buffer layout compatibility (§4.1, §6.6).

pub mod ops;
pub mod shapes;

pub use ops::gaussian_fill;
pub use shapes::{Array2, Array3, Kernel, Matrix, Vector};

/// An owning or non-owning contiguous buffer of `f32`.
///
/// `Shallow` borrows storage from elsewhere; the borrow checker prevents it
/// from outliving the backing array. Writing through a shallow view is
/// observed by whatever owns the backing storage; assigning an r-value into
/// a view copies into the view's storage (never reseats the borrow), and
/// reading a view into an owned target copies out. Both directions are
/// implemented as explicit methods (`copy_from`/`copy_into`) rather than
/// operator overloads so the copy direction is visible at the call site.
#[derive(Debug)]
pub enum DataArray<'a> {
    Owned(Vec<f32>),
    Shallow(&'a mut [f32]),
}

impl<'a> DataArray<'a> {
    pub fn zeros(len: usize) -> Self {
        DataArray::Owned(vec![0.0; len])
    }

    pub fn owned(data: Vec<f32>) -> Self {
        DataArray::Owned(data)
    }

    pub fn shallow(data: &'a mut [f32]) -> Self {
        DataArray::Shallow(data)
    }

    pub fn is_shallow(&self) -> bool {
        matches!(self, DataArray::Shallow(_))
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        match self {
            DataArray::Owned(v) => v.as_slice(),
            DataArray::Shallow(s) => s,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        match self {
            DataArray::Owned(v) => v.as_mut_slice(),
            DataArray::Shallow(s) => s,
        }
    }

    /// Copies `src` into this array's storage. If `self` is a shallow view,
    /// the write lands in the backing storage the view borrows, in place.
    pub fn copy_from(&mut self, src: &[f32]) {
        assert_eq!(self.len(), src.len(), "copy_from: length mismatch");
        self.as_mut_slice().copy_from_slice(src);
    }

    /// Copies this array's contents into `dst`. Used when reading a shallow
    /// r-value into an owned target; always a copy, never a move.
    pub fn copy_into(&self, dst: &mut [f32]) {
        assert_eq!(self.len(), dst.len(), "copy_into: length mismatch");
        dst.copy_from_slice(self.as_slice());
    }

    /// Produces a new owning array with the same contents.
    pub fn to_owned_array(&self) -> DataArray<'static> {
        DataArray::Owned(self.as_slice().to_vec())
    }

    /// Concatenates several arrays into one new owning buffer.
    pub fn concat(parts: &[&DataArray<'_>]) -> DataArray<'static> {
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let mut out = Vec::with_capacity(total);
        for p in parts {
            out.extend_from_slice(p.as_slice());
        }
        DataArray::Owned(out)
    }
}

impl<'a> Clone for DataArray<'a> {
    /// Cloning always produces an owning copy, even from a shallow source.
    fn clone(&self) -> Self {
        DataArray::Owned(self.as_slice().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shallow_view_writes_alias_backing_storage() {
        let mut backing = vec![1.0_f32, 2.0, 3.0];
        {
            let mut view = DataArray::shallow(&mut backing);
            view.copy_from(&[9.0, 9.0, 9.0]);
        }
        assert_eq!(backing, vec![9.0, 9.0, 9.0]);
    }

    #[test]
    fn reading_shallow_value_into_owned_target_copies() {
        let mut backing = vec![4.0_f32, 5.0];
        let view = DataArray::shallow(&mut backing);
        let mut target = vec![0.0_f32; 2];
        view.copy_into(&mut target);
        target[0] = 42.0;
        assert_eq!(backing[0], 4.0);
    }
}
