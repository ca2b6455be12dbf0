/// Row-major grid of elevation samples; row 0 is the north edge.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightField {
    pub width: usize,
    pub height: usize,
    pub samples: Vec<f32>,
}

impl HeightField {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            samples: vec![0.0; width * height],
        }
    }

    /// Takes `samples` as-is, padding with zeros or truncating to `width * height`.
    pub fn from_samples(width: usize, height: usize, mut samples: Vec<f32>) -> Self {
        samples.resize(width * height, 0.0);
        Self {
            width,
            height,
            samples,
        }
    }

    #[inline(always)]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.samples[self.idx(x, y)])
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        if x < self.width && y < self.height {
            let i = self.idx(x, y);
            self.samples[i] = v;
        }
    }

    /// `(min, max)` over all samples, `None` when empty.
    pub fn range(&self) -> Option<(f32, f32)> {
        let mut it = self.samples.iter().copied();
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 4);
        for v in &self.samples {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_and_bounds() {
        let mut hf = HeightField::new(3, 2);
        hf.set(2, 1, 5.0);
        hf.set(0, 0, -2.0);
        hf.set(3, 0, 100.0);
        assert_eq!(hf.range(), Some((-2.0, 5.0)));
        assert_eq!(hf.get(2, 1), Some(5.0));
        assert_eq!(hf.get(3, 0), None);
        assert_eq!(HeightField::new(0, 0).range(), None);
    }

    #[test]
    fn from_samples_fits_length() {
        assert_eq!(HeightField::from_samples(2, 2, vec![1.0]).samples, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(HeightField::from_samples(1, 1, vec![1.0, 2.0]).samples, vec![1.0]);
        assert_eq!(HeightField::from_samples(1, 2, vec![1.0, 2.0]).to_le_bytes().len(), 8);
    }
}
