//! Word classes by k-means clustering of the word vectors.

use std::io::Write;

use anyhow::{Context, Result};

use crate::net::NeuralNet;
use crate::real;

/// Rounds of reassignment.
const ITERATIONS: usize = 10;

/// Run K-means on the rows of `m` (`rows x size`, row-major) and return the
/// class of each row.
///
/// Rows start in class `row % classes`. Each round recomputes the centers,
/// normalized to length 1, and moves every row to the center with the largest
/// dot product.
#[allow(clippy::needless_range_loop)]
pub fn kmeans(m: &[real], size: usize, classes: usize) -> Vec<usize> {
    assert!(classes > 0, "need at least one class");
    assert!(size > 0 && m.len() % size == 0);
    let rows = m.len() / size;
    let mut centcn = vec![0usize; classes];
    let mut cl: Vec<usize> = (0..rows).map(|a| a % classes).collect();
    let mut cent: Vec<real> = vec![0.0; classes * size];

    for _ in 0..ITERATIONS {
        cent.fill(0.0);
        centcn.fill(1);

        // Set cent[c] = sum of vectors in class c, centcn[c] = number of vectors in class c + 1
        for c in 0..rows {
            for d in 0..size {
                cent[size * cl[c] + d] += m[c * size + d];
            }
            centcn[cl[c]] += 1;
        }

        // Set cent[c] = center of class c, normalized to length 1
        for (center, &n) in cent.chunks_mut(size).zip(&centcn) {
            for x in center.iter_mut() {
                *x /= n as real;
            }
            crate::normalize(center);
        }

        // Move vectors to nearest class (by dot-product similarity with center of class).
        for c in 0..rows {
            let row = &m[c * size..][..size];
            let mut closev: real = -10.0;
            let mut closeid = 0;
            for (d, center) in cent.chunks(size).enumerate() {
                let x = crate::dot(center, row);
                if x > closev {
                    closev = x;
                    closeid = d;
                }
            }
            cl[c] = closeid;
        }
    }
    cl
}

/// Cluster the trained word vectors and write one `word class` line per
/// vocabulary entry.
pub fn write_classes<W: Write>(net: &NeuralNet, mut out: W, classes: usize) -> Result<()> {
    let cl = kmeans(&net.words().to_vec(), net.config().dim, classes);
    for (vw, class) in net.vocab().entries().iter().zip(cl) {
        writeln!(out, "{} {}", vw.word, class)
            .context("error writing k-means classes to output file")?;
    }
    out.flush().context("error writing k-means classes to output file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_directions() {
        let mut m = vec![];
        for i in 0..10 {
            let wobble = i as real * 0.01;
            if i < 5 {
                m.extend_from_slice(&[1.0, wobble]);
            } else {
                m.extend_from_slice(&[wobble, 1.0]);
            }
        }
        let cl = kmeans(&m, 2, 2);
        assert_eq!(cl.len(), 10);
        for i in 0..10 {
            assert_eq!(cl[i] == cl[0], i < 5, "row {i}: {cl:?}");
        }
    }

    #[test]
    fn single_class() {
        let cl = kmeans(&[1.0, 2.0, 3.0, 4.0], 2, 1);
        assert_eq!(cl, vec![0, 0]);
    }
}
