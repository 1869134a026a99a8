//! Regular scalar grids: 3-D volumes and 2-D slices.

use crate::error::{Result, VolumeError};

/// A 2-D scalar image, row-major (`x` fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
}

impl Slice {
    pub fn new(width: usize, height: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != width * height {
            return Err(VolumeError::ShapeMismatch {
                dims: [width, height, 1],
                expected: width * height,
                got: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            width,
            height,
            values: vec![value; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.values[y * self.width + x] = value;
    }

    /// `(min, max)`; `(0, 0)` when empty.
    pub fn range(&self) -> (f64, f64) {
        min_max(&self.values)
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}

/// Point data on a regular grid, `x` fastest then `y` then `z`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarVolume {
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub values: Vec<f64>,
}

impl ScalarVolume {
    pub fn new(dims: [usize; 3], spacing: [f64; 3], origin: [f64; 3], values: Vec<f64>) -> Result<Self> {
        let expected = dims.iter().product();
        if values.len() != expected {
            return Err(VolumeError::ShapeMismatch {
                dims,
                expected,
                got: values.len(),
            });
        }
        Ok(Self {
            dims,
            spacing,
            origin,
            values,
        })
    }

    /// Stack equally sized slices along `z` with unit spacing.
    pub fn from_slices(slices: &[Slice]) -> Result<Self> {
        let (width, height) = slices
            .first()
            .map(|s| (s.width, s.height))
            .ok_or_else(|| VolumeError::InvalidParameter("no slices to stack".to_string()))?;
        let mut values = Vec::with_capacity(width * height * slices.len());
        for slice in slices {
            if slice.width != width || slice.height != height {
                return Err(VolumeError::InvalidParameter(format!(
                    "slice of {}x{} does not match {}x{}",
                    slice.width, slice.height, width, height
                )));
            }
            values.extend_from_slice(&slice.values);
        }
        Self::new([width, height, slices.len()], [1.0; 3], [0.0; 3], values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    pub fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.index(i, j, k)]
    }

    /// `(min, max)` of the point data.
    pub fn scalar_range(&self) -> (f64, f64) {
        min_max(&self.values)
    }

    /// World position of grid point `(i, j, k)`.
    pub fn position(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        [
            self.origin[0] + self.spacing[0] * i as f64,
            self.origin[1] + self.spacing[1] * j as f64,
            self.origin[2] + self.spacing[2] * k as f64,
        ]
    }

    /// Scalar gradient by central differences (one-sided at the borders),
    /// in world units.
    pub fn gradient(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        let idx = [i, j, k];
        let mut g = [0.0; 3];
        for axis in 0..3 {
            let n = self.dims[axis];
            if n < 2 {
                continue;
            }
            let lo = idx[axis].saturating_sub(1);
            let hi = (idx[axis] + 1).min(n - 1);
            let mut a = idx;
            let mut b = idx;
            a[axis] = lo;
            b[axis] = hi;
            let dv = self.value(b[0], b[1], b[2]) - self.value(a[0], a[1], a[2]);
            g[axis] = dv / ((hi - lo) as f64 * self.spacing[axis]);
        }
        g
    }

    /// The `z = k` plane as a slice.
    pub fn slice_z(&self, k: usize) -> Option<Slice> {
        if k >= self.dims[2] {
            return None;
        }
        let plane = self.dims[0] * self.dims[1];
        Some(Slice {
            width: self.dims[0],
            height: self.dims[1],
            values: self.values[k * plane..(k + 1) * plane].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> ScalarVolume {
        // value = i + 10 j + 100 k
        let mut values = Vec::new();
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..4 {
                    values.push((i + 10 * j + 100 * k) as f64);
                }
            }
        }
        ScalarVolume::new([4, 3, 3], [1.0, 2.0, 1.0], [0.0; 3], values).unwrap()
    }

    #[test]
    fn test_value_and_range() {
        let v = ramp();
        assert_eq!(v.value(3, 2, 1), 123.0);
        assert_eq!(v.scalar_range(), (0.0, 223.0));
        assert_eq!(v.position(1, 1, 1), [1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_gradient() {
        let v = ramp();
        assert_eq!(v.gradient(1, 1, 1), [1.0, 5.0, 100.0]);
        // One-sided at the border.
        assert_eq!(v.gradient(0, 0, 0), [1.0, 5.0, 100.0]);
    }

    #[test]
    fn test_slice_z_and_stack() {
        let v = ramp();
        let s = v.slice_z(2).unwrap();
        assert_eq!((s.width, s.height), (4, 3));
        assert_eq!(s.get(1, 2), 221.0);
        assert!(v.slice_z(3).is_none());

        let stacked = ScalarVolume::from_slices(&[v.slice_z(0).unwrap(), s]).unwrap();
        assert_eq!(stacked.dims, [4, 3, 2]);
        assert_eq!(stacked.value(1, 2, 1), 221.0);
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(matches!(
            ScalarVolume::new([2, 2, 2], [1.0; 3], [0.0; 3], vec![0.0; 7]),
            Err(VolumeError::ShapeMismatch { expected: 8, got: 7, .. })
        ));
        assert!(Slice::new(2, 2, vec![1.0]).is_err());
        assert!(ScalarVolume::from_slices(&[]).is_err());
    }
}
