// src/bsdiff/create.rs

//! Patch creation
//!
//! Walks the new file left to right, using a suffix array over the old file
//! to find the longest approximate match at each position. Matched regions
//! are extended forward and backward with a mismatch tolerance; the gap
//! between consecutive matches becomes literal extra bytes, the matched
//! span becomes byte-wise deltas against the old region.

use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::io::Write;

use crate::error::{Error, Result};

use super::suffix::suffix_array;
use super::{encode_off, MAGIC};

/// How many stray matching bytes an approximate match may absorb before the
/// scan settles on a new match position.
const MISMATCH_SLACK: usize = 8;

/// Number of leading bytes two slices share
fn match_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Longest match of `target`'s prefix anywhere in `old`, via binary search
/// over the suffix array. Returns (length, position in old).
fn search(sa: &[usize], old: &[u8], target: &[u8]) -> (usize, usize) {
    let mut lo = 0usize;
    let mut hi = sa.len() - 1;

    while hi - lo >= 2 {
        let mid = lo + (hi - lo) / 2;
        let suffix = &old[sa[mid]..];
        let n = suffix.len().min(target.len());
        if suffix[..n] < target[..n] {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let lo_len = match_len(&old[sa[lo]..], target);
    let hi_len = match_len(&old[sa[hi]..], target);
    if lo_len > hi_len {
        (lo_len, sa[lo])
    } else {
        (hi_len, sa[hi])
    }
}

fn bz_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::MalformedPatch(format!("bzip2 compression failed: {e}")))
}

/// Create a bsdiff-1 patch transforming `old` into `new`.
pub fn create(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    let sa = suffix_array(old);

    let old_len = old.len();
    let new_len = new.len();

    let mut ctrl = Vec::new();
    let mut diff = Vec::new();
    let mut extra = Vec::new();

    let mut scan = 0usize;
    let mut len = 0usize;
    let mut pos = 0usize;
    let mut last_scan = 0usize;
    let mut last_pos = 0usize;
    let mut last_offset = 0isize;

    while scan < new_len {
        let mut old_score = 0usize;

        scan += len;
        let mut scsc = scan;
        while scan < new_len {
            let (l, p) = search(&sa, old, &new[scan..]);
            len = l;
            pos = p;

            while scsc < scan + len {
                let shifted = scsc as isize + last_offset;
                if shifted >= 0 && (shifted as usize) < old_len && old[shifted as usize] == new[scsc]
                {
                    old_score += 1;
                }
                scsc += 1;
            }

            if (len == old_score && len != 0) || len > old_score + MISMATCH_SLACK {
                break;
            }

            let shifted = scan as isize + last_offset;
            if shifted >= 0 && (shifted as usize) < old_len && old[shifted as usize] == new[scan] {
                old_score = old_score.saturating_sub(1);
            }
            scan += 1;
        }

        if len != old_score || scan == new_len {
            // Extend the previous match region forward while at least half
            // the extension still matches.
            let mut score = 0isize;
            let mut best_score = 0isize;
            let mut len_fwd = 0usize;
            let mut i = 0usize;
            while last_scan + i < scan && last_pos + i < old_len {
                if old[last_pos + i] == new[last_scan + i] {
                    score += 1;
                }
                i += 1;
                if score * 2 - i as isize > best_score * 2 - len_fwd as isize {
                    best_score = score;
                    len_fwd = i;
                }
            }

            // Extend the new match region backward the same way.
            let mut len_back = 0usize;
            if scan < new_len {
                let mut score = 0isize;
                let mut best_score = 0isize;
                let mut i = 1usize;
                while scan >= last_scan + i && pos >= i {
                    if old[pos - i] == new[scan - i] {
                        score += 1;
                    }
                    if score * 2 - i as isize > best_score * 2 - len_back as isize {
                        best_score = score;
                        len_back = i;
                    }
                    i += 1;
                }
            }

            // The two extensions may overlap; split the overlap at the point
            // that favours whichever side matches better.
            if last_scan + len_fwd > scan - len_back {
                let overlap = (last_scan + len_fwd) - (scan - len_back);
                let mut score = 0isize;
                let mut best_score = 0isize;
                let mut split = 0usize;
                for i in 0..overlap {
                    if new[last_scan + len_fwd - overlap + i] == old[last_pos + len_fwd - overlap + i]
                    {
                        score += 1;
                    }
                    if new[scan - len_back + i] == old[pos - len_back + i] {
                        score -= 1;
                    }
                    if score > best_score {
                        best_score = score;
                        split = i + 1;
                    }
                }
                len_fwd = len_fwd - overlap + split;
                len_back -= split;
            }

            for i in 0..len_fwd {
                diff.push(new[last_scan + i].wrapping_sub(old[last_pos + i]));
            }
            let copy_len = (scan - len_back) - (last_scan + len_fwd);
            extra.extend_from_slice(&new[last_scan + len_fwd..scan - len_back]);

            let seek = (pos as i64 - len_back as i64) - (last_pos as i64 + len_fwd as i64);
            ctrl.extend_from_slice(&encode_off(len_fwd as i64));
            ctrl.extend_from_slice(&encode_off(copy_len as i64));
            ctrl.extend_from_slice(&encode_off(seek));

            last_scan = scan - len_back;
            last_pos = pos - len_back;
            last_offset = pos as isize - scan as isize;
        }
    }

    let ctrl_z = bz_compress(&ctrl)?;
    let diff_z = bz_compress(&diff)?;
    let extra_z = bz_compress(&extra)?;

    let mut patch = Vec::with_capacity(32 + ctrl_z.len() + diff_z.len() + extra_z.len());
    patch.extend_from_slice(MAGIC);
    patch.extend_from_slice(&encode_off(ctrl_z.len() as i64));
    patch.extend_from_slice(&encode_off(diff_z.len() as i64));
    patch.extend_from_slice(&encode_off(new_len as i64));
    patch.extend_from_slice(&ctrl_z);
    patch.extend_from_slice(&diff_z);
    patch.extend_from_slice(&extra_z);

    Ok(patch)
}
