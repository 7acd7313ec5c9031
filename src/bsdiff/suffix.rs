// src/bsdiff/suffix.rs

//! Suffix array construction for the delta generator
//!
//! Prefix-doubling sort: every pass orders suffixes by their first 2^k
//! characters using the previous pass's ranks as sort keys. The returned
//! array carries the empty suffix at index 0, matching what the match
//! search expects at its binary-search boundaries.

/// Build the suffix array over `data`: indices of all suffixes (the empty
/// suffix included) in lexicographic order. Length is `data.len() + 1`.
pub(crate) fn suffix_array(data: &[u8]) -> Vec<usize> {
    let n = data.len();
    if n == 0 {
        return vec![0];
    }

    let mut sa: Vec<usize> = (0..n).collect();
    let mut rank: Vec<i64> = data.iter().map(|&b| i64::from(b)).collect();
    let mut next_rank = vec![0i64; n];
    let mut k = 1usize;

    loop {
        let key = |i: usize| -> (i64, i64) {
            let second = if i + k < n { rank[i + k] } else { -1 };
            (rank[i], second)
        };

        sa.sort_unstable_by_key(|&i| key(i));

        next_rank[sa[0]] = 0;
        for j in 1..n {
            let bump = i64::from(key(sa[j]) != key(sa[j - 1]));
            next_rank[sa[j]] = next_rank[sa[j - 1]] + bump;
        }
        rank.copy_from_slice(&next_rank);

        // all ranks distinct: fully sorted
        if rank[sa[n - 1]] == (n - 1) as i64 {
            break;
        }
        k *= 2;
    }

    let mut with_empty = Vec::with_capacity(n + 1);
    with_empty.push(n);
    with_empty.extend(sa);
    with_empty
}
