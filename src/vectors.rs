//! Exported vector files.
//!
//! Both formats start with a `rows cols` header line. In the text format each
//! row is the label followed by its values in decimal. In the binary format
//! each row is the label, a space, `cols` native-endian `f32`s and a newline.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::ops::Index;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{dot, norm, normalize, real, MAX_STRING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorFormat {
    Text,
    Binary,
}

/// Write `rows` under a `count dim` header.
pub(crate) fn write_rows<'r, W, I>(
    mut out: W,
    format: VectorFormat,
    count: usize,
    dim: usize,
    rows: I,
) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = (&'r str, &'r [real])>,
{
    writeln!(out, "{} {}", count, dim).context("error writing output file")?;
    for (label, row) in rows {
        debug_assert_eq!(row.len(), dim);
        write!(out, "{} ", label).context("error writing output file")?;
        match format {
            VectorFormat::Binary => {
                out.write_all(bytemuck::cast_slice::<real, u8>(row))
                    .context("error writing output file")?;
            }
            VectorFormat::Text => {
                for f in row {
                    write!(out, "{} ", f).context("error writing output file")?;
                }
            }
        }
        writeln!(out).context("error writing output file")?;
    }
    out.flush().context("error writing output file")?;
    Ok(())
}

/// A table of labelled vectors read back from an export.
#[derive(Debug, Clone, PartialEq)]
pub struct Vectors {
    words: Vec<String>,
    dim: usize,
    m: Vec<real>,
}

impl Vectors {
    pub fn new(words: Vec<String>, dim: usize, m: Vec<real>) -> Self {
        assert_eq!(words.len() * dim, m.len());
        Vectors { words, dim, m }
    }

    pub fn load(file_name: &Path, format: VectorFormat) -> Result<Self> {
        let f = BufReader::new(
            File::open(file_name)
                .with_context(|| format!("error opening input file {}", file_name.display()))?,
        );
        Self::read(f, format)
    }

    /// Read an export. Values are kept exactly as stored; call
    /// [`normalize_rows`](Self::normalize_rows) before cosine queries.
    pub fn read<R: BufRead>(mut f: R, format: VectorFormat) -> Result<Self> {
        let mut line = String::new();
        f.read_line(&mut line).context("error reading input file")?;
        let mut fields = line.split_whitespace();
        let words: usize = fields
            .next()
            .ok_or_else(|| anyhow!("invalid input file: missing header"))?
            .parse()
            .context("invalid input file")?;
        let dim: usize = fields
            .next()
            .ok_or_else(|| anyhow!("invalid input file: missing header"))?
            .parse()
            .context("invalid input file")?;

        let mut vocab: Vec<String> = Vec::with_capacity(words);
        let mut m = vec![0.0; words * dim];
        for b in 0..words {
            let row = &mut m[b * dim..][..dim];
            let word = match format {
                VectorFormat::Binary => read_binary_row(&mut f, row)?,
                VectorFormat::Text => read_text_row(&mut f, row)?,
            }
            .ok_or_else(|| anyhow!("input file ended after {b} of {words} rows"))?;
            vocab.push(word);
        }

        Ok(Vectors {
            words: vocab,
            dim,
            m,
        })
    }

    pub fn write<W: Write>(&self, out: W, format: VectorFormat) -> Result<()> {
        write_rows(
            out,
            format,
            self.len(),
            self.dim,
            (0..self.len()).map(|i| (self.words[i].as_str(), &self[i])),
        )
    }

    pub fn save(&self, file_name: &Path, format: VectorFormat) -> Result<()> {
        let out = BufWriter::new(
            File::create(file_name)
                .with_context(|| format!("error creating output file {}", file_name.display()))?,
        );
        self.write(out, format)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn word(&self, i: usize) -> &str {
        &self.words[i]
    }

    pub fn lookup_word(&self, word: &str) -> Option<usize> {
        self.words.iter().position(|w| w == word)
    }

    /// Scale every row to unit length.
    pub fn normalize_rows(&mut self) {
        if self.dim == 0 {
            return;
        }
        for row in self.m.chunks_mut(self.dim) {
            normalize(row);
        }
    }

    /// The `n` rows most similar to `query` by cosine similarity, best first,
    /// leaving out the rows in `exclude`.
    pub fn nearest(&self, query: &[real], n: usize, exclude: &[usize]) -> Vec<(usize, real)> {
        let qlen = norm(query);
        let mut best: Vec<(usize, real)> = (0..self.len())
            .filter(|c| !exclude.contains(c))
            .map(|c| {
                let row = &self[c];
                let len = norm(row) * qlen;
                let sim = if len == 0.0 { 0.0 } else { dot(query, row) / len };
                (c, sim)
            })
            .collect();
        best.sort_by_key(|&(_, sim)| std::cmp::Reverse(OrderedFloat(sim)));
        best.truncate(n);
        best
    }
}

impl Index<usize> for Vectors {
    type Output = [real];

    fn index(&self, i: usize) -> &[real] {
        &self.m[i * self.dim..][..self.dim]
    }
}

fn read_binary_row<R: BufRead>(f: &mut R, row: &mut [real]) -> Result<Option<String>> {
    let mut vocab_word = Vec::<u8>::with_capacity(MAX_STRING);
    let count = f
        .read_until(b' ', &mut vocab_word)
        .context("error reading input file")?;
    if count == 0 {
        return Ok(None);
    }
    if vocab_word.last() == Some(&b' ') {
        vocab_word.pop();
    }
    vocab_word.retain(|c| *c != b'\n');
    let word = String::from_utf8(vocab_word).context("invalid word in input file")?;

    let mut bytes = vec![0u8; std::mem::size_of_val(row)];
    f.read_exact(&mut bytes).context("error reading input file")?;
    for (x, chunk) in row.iter_mut().zip(bytes.chunks_exact(4)) {
        *x = bytemuck::pod_read_unaligned(chunk);
    }
    Ok(Some(word))
}

fn read_text_row<R: BufRead>(f: &mut R, row: &mut [real]) -> Result<Option<String>> {
    let mut line = String::new();
    if f.read_line(&mut line).context("error reading input file")? == 0 {
        return Ok(None);
    }
    let mut fields = line.split_whitespace();
    let word = fields
        .next()
        .ok_or_else(|| anyhow!("invalid input file: empty row"))?
        .to_string();
    let mut n = 0;
    for field in fields {
        if n == row.len() {
            bail!("row for {word:?} has more than {} values", row.len());
        }
        row[n] = field
            .parse()
            .with_context(|| format!("invalid number {field:?} in row for {word:?}"))?;
        n += 1;
    }
    if n != row.len() {
        bail!("row for {word:?} has {n} values, expected {}", row.len());
    }
    Ok(Some(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vectors {
        Vectors::new(
            vec!["north".into(), "south".into(), "*_0".into()],
            3,
            vec![
                0.1, -2.5e-7, 3.0, //
                1.0 / 3.0, f32::MIN_POSITIVE, -0.0, //
                123456.79, -1.0e-3, 0.7,
            ],
        )
    }

    fn round_trip(v: &Vectors, format: VectorFormat) -> Vectors {
        let mut buf = vec![];
        v.write(&mut buf, format).unwrap();
        Vectors::read(buf.as_slice(), format).unwrap()
    }

    #[test]
    fn binary_round_trip_is_bit_exact() {
        let v = sample();
        let back = round_trip(&v, VectorFormat::Binary);
        assert_eq!(back.words, v.words);
        let bits = |m: &[real]| m.iter().map(|x| x.to_bits()).collect::<Vec<u32>>();
        assert_eq!(bits(&back.m), bits(&v.m));
    }

    #[test]
    fn text_round_trip_is_exact() {
        let v = sample();
        let back = round_trip(&v, VectorFormat::Text);
        assert_eq!(back, v);
    }

    #[test]
    fn text_layout() {
        let v = Vectors::new(vec!["a".into()], 2, vec![0.5, -1.0]);
        let mut buf = vec![];
        v.write(&mut buf, VectorFormat::Text).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1 2\na 0.5 -1 \n");
    }

    #[test]
    fn truncated_files_are_errors() {
        let err = Vectors::read("2 2\na 1 2\n".as_bytes(), VectorFormat::Text).unwrap_err();
        assert!(err.to_string().contains("ended after 1 of 2"));
        let err = Vectors::read("1 3\na 1 2\n".as_bytes(), VectorFormat::Text).unwrap_err();
        assert!(err.to_string().contains("expected 3"));
        assert!(Vectors::read("".as_bytes(), VectorFormat::Binary).is_err());
    }

    #[test]
    fn nearest_by_cosine() {
        let mut v = Vectors::new(
            vec!["x".into(), "y".into(), "xy".into(), "zero".into()],
            2,
            vec![2.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0],
        );
        v.normalize_rows();
        assert_eq!(v[0], [1.0, 0.0]);
        let x = v.lookup_word("x").unwrap();
        let hits = v.nearest(&v[x].to_vec(), 2, &[x]);
        assert_eq!(hits[0].0, 2);
        assert!((hits[0].1 - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(hits[1].1, 0.0);
        assert_eq!(v.lookup_word("w"), None);
    }
}
