//! Erasure split / merge
//!
//! `split` turns an aligned byte buffer into the fragment stored on one
//! node; `merge` reconstructs the original buffer from any K of the N
//! fragments. The code is a Rabin-style IDA over GF(2^8): fragment `row`
//! holds, for each aligned word, the linear combination
//! `sum_i( column_i * (row + 1)^i )` of the K interleaved column words.
//! No row is an identity row; with `row = 0` the multiplier is 1 and the
//! fragment is the XOR of all columns.
//!
//! Reconstruction builds the K x K evaluation matrix from the supplied row
//! indices, inverts it with Gauss-Jordan elimination over the field
//! (zero-pivot lookahead, explicit div/mul through the log tables) and
//! applies the inverse. An off-by-one in row indexing would silently
//! corrupt file data, which is why the row/multiplier mapping lives in
//! exactly one place ([`row_multiplier`]).

use crate::gf;
use bytes::Bytes;
use stripefs_common::config::WORD_SIZE;
use stripefs_common::{ClusterConfig, Error, Result};

/// The GF multiplier assigned to a fragment row: `row + 1`.
///
/// Row indices are node indices (`0..N`); multiplier 0 would erase a
/// column, so rows map to the multipliers `1..=N`.
#[inline]
#[must_use]
pub const fn row_multiplier(row: usize) -> u8 {
    (row + 1) as u8
}

/// Split/merge engine for one cluster geometry.
///
/// Stateless apart from the geometry; both operations are pure functions
/// of their inputs and safe to share across threads.
#[derive(Clone, Debug)]
pub struct ErasureCoder {
    /// K: interleaved data columns per stripe.
    columns: usize,
    /// N: total fragment rows.
    nodes: usize,
}

impl ErasureCoder {
    /// Build a coder for the given geometry.
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            columns: config.fragments(),
            nodes: config.nodes,
        })
    }

    /// K, the number of fragments needed for reconstruction.
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// N, the total number of fragment rows.
    #[must_use]
    pub const fn nodes(&self) -> usize {
        self.nodes
    }

    /// Bytes of original data consumed per split unit.
    #[must_use]
    pub const fn unit_size(&self) -> usize {
        self.columns * WORD_SIZE
    }

    /// Produce the fragment stored on `row` for an aligned `input`.
    ///
    /// `input.len()` must be a multiple of [`Self::unit_size`]; the
    /// fragment is `input.len() / columns` bytes.
    pub fn split(&self, row: usize, input: &[u8]) -> Result<Bytes> {
        if row >= self.nodes {
            return Err(Error::invalid_argument(format!(
                "fragment row {row} out of range 0..{}",
                self.nodes
            )));
        }
        if input.len() % self.unit_size() != 0 {
            return Err(Error::Unaligned {
                offset: input.len() as u64,
                alignment: self.unit_size() as u64,
            });
        }

        let x = row_multiplier(row);
        let mut out = vec![0u8; input.len() / self.columns];

        for (unit, word) in input
            .chunks_exact(self.unit_size())
            .zip(out.chunks_exact_mut(WORD_SIZE))
        {
            // Horner evaluation: acc = ((c_{K-1} * x) + c_{K-2}) * x + ...
            word.copy_from_slice(&unit[(self.columns - 1) * WORD_SIZE..]);
            for col in (0..self.columns - 1).rev() {
                gf::mul_slice(x, word);
                gf::xor_slice(word, &unit[col * WORD_SIZE..(col + 1) * WORD_SIZE]);
            }
        }

        Ok(Bytes::from(out))
    }

    /// Produce all N fragments of an aligned buffer, one per row.
    pub fn split_all(&self, input: &[u8]) -> Result<Vec<Bytes>> {
        (0..self.nodes).map(|row| self.split(row, input)).collect()
    }

    /// Reconstruct the original buffer from exactly K fragments.
    ///
    /// `rows[i]` names the fragment row `inputs[i]` came from; the rows
    /// must be distinct, valid, and the fragments equal-length and
    /// word-aligned. The output is `columns * fragment_len` bytes,
    /// byte-exact to the original.
    pub fn merge(&self, rows: &[usize], inputs: &[&[u8]]) -> Result<Vec<u8>> {
        if rows.len() != self.columns || inputs.len() != self.columns {
            return Err(Error::InsufficientFragments {
                available: rows.len().min(inputs.len()),
                required: self.columns,
            });
        }
        for (i, &row) in rows.iter().enumerate() {
            if row >= self.nodes {
                return Err(Error::invalid_argument(format!(
                    "fragment row {row} out of range 0..{}",
                    self.nodes
                )));
            }
            if rows[..i].contains(&row) {
                return Err(Error::invalid_argument(format!(
                    "duplicate fragment row {row}"
                )));
            }
        }
        let frag_len = inputs[0].len();
        if frag_len % WORD_SIZE != 0 {
            return Err(Error::Unaligned {
                offset: frag_len as u64,
                alignment: WORD_SIZE as u64,
            });
        }
        if inputs.iter().any(|f| f.len() != frag_len) {
            return Err(Error::FragmentSizeMismatch);
        }

        let inv = self.inverse_matrix(rows)?;

        let mut out = vec![0u8; frag_len * self.columns];
        let unit = self.unit_size();
        for (u, out_unit) in out.chunks_exact_mut(unit).enumerate() {
            let off = u * WORD_SIZE;
            for col in 0..self.columns {
                let word = &mut out_unit[col * WORD_SIZE..(col + 1) * WORD_SIZE];
                for (i, frag) in inputs.iter().enumerate() {
                    gf::mul_slice_acc(inv[col][i], &frag[off..off + WORD_SIZE], word);
                }
            }
        }

        Ok(out)
    }

    /// Invert the K x K evaluation matrix for the given rows via
    /// Gauss-Jordan elimination over GF(2^8).
    fn inverse_matrix(&self, rows: &[usize]) -> Result<Vec<Vec<u8>>> {
        let k = self.columns;

        // a[i][j] = x_i^j with x_i the row multiplier; inv starts as I.
        let mut a: Vec<Vec<u8>> = rows
            .iter()
            .map(|&row| (0..k).map(|j| gf::exp(row_multiplier(row), j)).collect())
            .collect();
        let mut inv: Vec<Vec<u8>> = (0..k)
            .map(|i| (0..k).map(|j| u8::from(i == j)).collect())
            .collect();

        for p in 0..k {
            // Zero-pivot lookahead: swap in a row with a usable pivot.
            if a[p][p] == 0 {
                let swap = (p + 1..k).find(|&r| a[r][p] != 0).ok_or(Error::SingularMatrix)?;
                a.swap(p, swap);
                inv.swap(p, swap);
            }

            let pivot = a[p][p];
            for j in 0..k {
                a[p][j] = gf::div(a[p][j], pivot);
                inv[p][j] = gf::div(inv[p][j], pivot);
            }

            for r in 0..k {
                if r == p || a[r][p] == 0 {
                    continue;
                }
                let factor = a[r][p];
                for j in 0..k {
                    let ap = a[p][j];
                    let ip = inv[p][j];
                    a[r][j] ^= gf::mul(factor, ap);
                    inv[r][j] ^= gf::mul(factor, ip);
                }
            }
        }

        Ok(inv)
    }
}
