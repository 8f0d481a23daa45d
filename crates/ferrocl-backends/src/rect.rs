//! Strided 3-D copy geometry shared by buffer-rect, image and map transfers.
//!
//! Everything is expressed in bytes: `region[0]` is the width of a row,
//! `region[1]` the number of rows per slice and `region[2]` the number of
//! slices. Linear transfers are the degenerate `[len, 1, 1]` case.

use crate::error::{BackendError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectCopy {
    /// Byte offset of the first row in the source.
    pub src_offset: usize,
    /// Byte offset of the first row in the destination.
    pub dst_offset: usize,
    pub region: [usize; 3],
    pub src_row_pitch: usize,
    pub src_slice_pitch: usize,
    pub dst_row_pitch: usize,
    pub dst_slice_pitch: usize,
}

impl RectCopy {
    pub fn linear(src_offset: usize, dst_offset: usize, len: usize) -> Self {
        Self {
            src_offset,
            dst_offset,
            region: [len, 1, 1],
            src_row_pitch: len,
            src_slice_pitch: len,
            dst_row_pitch: len,
            dst_slice_pitch: len,
        }
    }

    /// The same geometry with source and destination swapped.
    pub fn reversed(&self) -> Self {
        Self {
            src_offset: self.dst_offset,
            dst_offset: self.src_offset,
            region: self.region,
            src_row_pitch: self.dst_row_pitch,
            src_slice_pitch: self.dst_slice_pitch,
            dst_row_pitch: self.src_row_pitch,
            dst_slice_pitch: self.src_slice_pitch,
        }
    }

    /// Total bytes moved.
    pub fn byte_len(&self) -> usize {
        self.region.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    /// One past the last source byte touched, `None` on overflow.
    pub fn src_end(&self) -> Option<usize> {
        span_end(self.src_offset, self.region, self.src_row_pitch, self.src_slice_pitch)
    }

    /// One past the last destination byte touched, `None` on overflow.
    pub fn dst_end(&self) -> Option<usize> {
        span_end(self.dst_offset, self.region, self.dst_row_pitch, self.dst_slice_pitch)
    }

    /// Check both sides against the sizes of the storages involved.
    pub fn check_bounds(&self, src_len: usize, dst_len: usize) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        match self.src_end() {
            Some(end) if end <= src_len => {}
            _ => return Err(BackendError::out_of_bounds(self.src_offset, self.byte_len(), src_len)),
        }
        match self.dst_end() {
            Some(end) if end <= dst_len => Ok(()),
            _ => Err(BackendError::out_of_bounds(self.dst_offset, self.byte_len(), dst_len)),
        }
    }

    /// Start offsets of each row as `(src, dst)` pairs, slice-major.
    pub fn rows(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let [_, rows, slices] = self.region;
        (0..slices).flat_map(move |z| {
            (0..rows).map(move |y| {
                (
                    self.src_offset + z * self.src_slice_pitch + y * self.src_row_pitch,
                    self.dst_offset + z * self.dst_slice_pitch + y * self.dst_row_pitch,
                )
            })
        })
    }

    /// True when, within one storage, some source row intersects some
    /// destination row.
    pub fn overlaps(&self) -> bool {
        let width = self.region[0];
        if width == 0 {
            return false;
        }
        let (src_end, dst_end) = match (self.src_end(), self.dst_end()) {
            (Some(s), Some(d)) => (s, d),
            _ => return true,
        };
        if src_end <= self.dst_offset || dst_end <= self.src_offset {
            return false;
        }
        let mut dst_rows: Vec<usize> = self.rows().map(|(_, dst)| dst).collect();
        dst_rows.sort_unstable();
        self.rows().any(|(src, _)| {
            // First destination row starting at or after `src`, and the one before it.
            let idx = dst_rows.partition_point(|&dst| dst < src);
            let hits_next = dst_rows.get(idx).is_some_and(|&dst| dst < src + width);
            let hits_prev = idx > 0 && dst_rows[idx - 1] + width > src;
            hits_next || hits_prev
        })
    }
}

fn span_end(offset: usize, region: [usize; 3], row_pitch: usize, slice_pitch: usize) -> Option<usize> {
    let [width, rows, slices] = region;
    if width == 0 || rows == 0 || slices == 0 {
        return Some(offset);
    }
    let last_slice = (slices - 1).checked_mul(slice_pitch)?;
    let last_row = (rows - 1).checked_mul(row_pitch)?;
    offset.checked_add(last_slice)?.checked_add(last_row)?.checked_add(width)
}

/// Copy between two distinct byte slices.
pub fn copy_rect(src: &[u8], dst: &mut [u8], rect: &RectCopy) -> Result<()> {
    rect.check_bounds(src.len(), dst.len())?;
    let width = rect.region[0];
    for (s, d) in rect.rows() {
        dst[d..d + width].copy_from_slice(&src[s..s + width]);
    }
    Ok(())
}

/// Copy inside a single byte slice. Rows are moved one at a time, so
/// overlapping rows are only well defined when the caller has rejected them.
pub fn copy_rect_within(bytes: &mut [u8], rect: &RectCopy) -> Result<()> {
    rect.check_bounds(bytes.len(), bytes.len())?;
    let width = rect.region[0];
    for (s, d) in rect.rows() {
        bytes.copy_within(s..s + width, d);
    }
    Ok(())
}
