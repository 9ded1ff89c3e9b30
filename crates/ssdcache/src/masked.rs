// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Masked row scatter and gather over row-major buffers.
//!
//! Both directions skip entries whose index is negative, so planner outputs that use
//! `-1` for "no slot" can be fed in unchanged.

use crate::IndexOutOfBounds;

/// Copies row `i` of `values` into row `indices[i]` of `dest`, for the first `count` indices.
///
/// Returns the number of rows copied.
///
/// # Errors
///
/// Returns [`IndexOutOfBounds`] if an index points past `dest` or `values` holds fewer
/// than `count` rows. Rows before the offending one have already been copied.
///
/// # Examples
///
/// ```
/// let mut cache = [0_u8; 6];
/// let moved = ssdcache::masked_put(&mut cache, &[2, -1, 0], &[1, 1, 2, 2, 3, 3], 3, 2)?;
///
/// assert_eq!(moved, 2);
/// assert_eq!(cache, [3, 3, 0, 0, 1, 1]);
/// # Ok::<(), ssdcache::IndexOutOfBounds>(())
/// ```
pub fn masked_put<T: Copy>(
    dest: &mut [T],
    indices: &[i64],
    values: &[T],
    count: usize,
    row_len: usize,
) -> Result<usize, IndexOutOfBounds> {
    let Some(dest_rows) = dest.len().checked_div(row_len) else {
        return Ok(0);
    };
    let value_rows = values.len() / row_len;

    let mut moved = 0;
    for (i, &index) in indices.iter().take(count).enumerate() {
        let Ok(target) = usize::try_from(index) else {
            continue;
        };
        if target >= dest_rows {
            return Err(IndexOutOfBounds::new(index, dest_rows));
        }
        if i >= value_rows {
            return Err(IndexOutOfBounds::new(crate::to_signed_index(i), value_rows));
        }
        dest[target * row_len..(target + 1) * row_len].copy_from_slice(&values[i * row_len..(i + 1) * row_len]);
        moved += 1;
    }
    Ok(moved)
}

/// Copies row `indices[i]` of `values` into row `i` of `dest`, for the first `count` indices.
///
/// Returns the number of rows copied; rows of `dest` at negative indices are left untouched.
///
/// # Errors
///
/// Returns [`IndexOutOfBounds`] if an index points past `values` or `dest` holds fewer
/// than `count` rows.
///
/// # Examples
///
/// ```
/// let cache = [3_u8, 3, 0, 0, 1, 1];
/// let mut scratch = [9_u8; 4];
/// ssdcache::masked_select(&mut scratch, &[2, -1], &cache, 2, 2)?;
///
/// assert_eq!(scratch, [1, 1, 9, 9]);
/// # Ok::<(), ssdcache::IndexOutOfBounds>(())
/// ```
pub fn masked_select<T: Copy>(
    dest: &mut [T],
    indices: &[i64],
    values: &[T],
    count: usize,
    row_len: usize,
) -> Result<usize, IndexOutOfBounds> {
    let Some(value_rows) = values.len().checked_div(row_len) else {
        return Ok(0);
    };
    let dest_rows = dest.len() / row_len;

    let mut moved = 0;
    for (i, &index) in indices.iter().take(count).enumerate() {
        let Ok(source) = usize::try_from(index) else {
            continue;
        };
        if source >= value_rows {
            return Err(IndexOutOfBounds::new(index, value_rows));
        }
        if i >= dest_rows {
            return Err(IndexOutOfBounds::new(crate::to_signed_index(i), dest_rows));
        }
        dest[i * row_len..(i + 1) * row_len].copy_from_slice(&values[source * row_len..(source + 1) * row_len]);
        moved += 1;
    }
    Ok(moved)
}
