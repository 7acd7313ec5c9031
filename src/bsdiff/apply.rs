// src/bsdiff/apply.rs

//! Patch application
//!
//! Reconstruction is fully validated before any byte escapes: the declared
//! output length is allocated up front, every control triple is bounds
//! checked against both the output and the old file, and any violation is a
//! fatal `MalformedPatch`. Callers only ever see a complete output buffer.

use bzip2::read::BzDecoder;
use std::io::Read;

use crate::error::{Error, Result};

use super::{decode_off, HEADER_LEN, MAGIC};

/// Read one sign-magnitude 64-bit integer from a control stream
fn read_off<R: Read>(reader: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::MalformedPatch("truncated control stream".to_string()))?;
    Ok(decode_off(&buf))
}

/// Apply a bsdiff-1 patch to `old`, returning the reconstructed new file.
pub fn apply(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    if patch.len() < HEADER_LEN {
        return Err(Error::MalformedPatch("truncated header".to_string()));
    }
    if &patch[..8] != MAGIC {
        return Err(Error::MalformedPatch("bad magic".to_string()));
    }

    let ctrl_len = decode_off(&patch[8..16]);
    let diff_len = decode_off(&patch[16..24]);
    let new_len = decode_off(&patch[24..32]);

    if ctrl_len < 0 || diff_len < 0 || new_len < 0 {
        return Err(Error::MalformedPatch(
            "negative length in header".to_string(),
        ));
    }
    let ctrl_len = ctrl_len as usize;
    let diff_len = diff_len as usize;
    let new_len = new_len as usize;

    let ctrl_end = HEADER_LEN
        .checked_add(ctrl_len)
        .ok_or_else(|| Error::MalformedPatch("control length overflow".to_string()))?;
    let diff_end = ctrl_end
        .checked_add(diff_len)
        .ok_or_else(|| Error::MalformedPatch("diff length overflow".to_string()))?;
    if diff_end > patch.len() {
        return Err(Error::MalformedPatch(
            "declared stream lengths exceed patch size".to_string(),
        ));
    }

    let mut ctrl = BzDecoder::new(&patch[HEADER_LEN..ctrl_end]);
    let mut diff = BzDecoder::new(&patch[ctrl_end..diff_end]);
    let mut extra = BzDecoder::new(&patch[diff_end..]);

    let mut new = vec![0u8; new_len];
    let mut new_pos = 0usize;
    let mut old_pos = 0usize; // invariant: old_pos <= old.len()

    let mut add_buf = Vec::new();

    while new_pos < new_len {
        let add = read_off(&mut ctrl)?;
        let copy = read_off(&mut ctrl)?;
        let seek = read_off(&mut ctrl)?;

        if add < 0 || copy < 0 {
            return Err(Error::MalformedPatch(
                "negative add/copy in control triple".to_string(),
            ));
        }
        let add = add as usize;
        let copy = copy as usize;

        if add > new_len - new_pos {
            return Err(Error::MalformedPatch(
                "add run exceeds declared output length".to_string(),
            ));
        }
        if add > old.len() - old_pos {
            return Err(Error::MalformedPatch(
                "add run reads past end of old file".to_string(),
            ));
        }

        if add > 0 {
            add_buf.resize(add, 0);
            diff.read_exact(&mut add_buf)
                .map_err(|_| Error::MalformedPatch("truncated diff stream".to_string()))?;
            for i in 0..add {
                new[new_pos + i] = add_buf[i].wrapping_add(old[old_pos + i]);
            }
        }
        new_pos += add;
        old_pos += add;

        if copy > new_len - new_pos {
            return Err(Error::MalformedPatch(
                "copy run exceeds declared output length".to_string(),
            ));
        }
        if copy > 0 {
            extra
                .read_exact(&mut new[new_pos..new_pos + copy])
                .map_err(|_| Error::MalformedPatch("truncated extra stream".to_string()))?;
        }
        new_pos += copy;

        let seeked = (old_pos as i64)
            .checked_add(seek)
            .ok_or_else(|| Error::MalformedPatch("seek overflow".to_string()))?;
        if seeked < 0 || seeked as usize > old.len() {
            return Err(Error::MalformedPatch(
                "seek leaves the old file".to_string(),
            ));
        }
        old_pos = seeked as usize;
    }

    Ok(new)
}
