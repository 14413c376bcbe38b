use std::path::Path;

use crate::Conditioning;

use super::model::OnnxError;

/// Style vector dimension.
pub const STYLE_DIM: usize = 256;

/// Table of style vectors for one voice, indexed by phoneme token count.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTable {
    rows: Vec<[f32; STYLE_DIM]>,
}

impl StyleTable {
    /// Read a `.npy` file holding a little-endian float32 `[N, 256]` array
    /// (a leading singleton axis, `[N, 1, 256]`, is accepted too).
    pub fn load(path: &Path) -> Result<Self, OnnxError> {
        let data = std::fs::read(path)?;
        let name = path.display().to_string();
        let rows = parse_npy(&data, &name)?;
        log::info!("Loaded {} style vectors from {}", rows.len(), name);
        Ok(Self { rows })
    }

    /// Rebuild a table from a flattened conditioning latent.
    pub fn from_flat(values: &[f32]) -> Result<Self, OnnxError> {
        if values.is_empty() || values.len() % STYLE_DIM != 0 {
            return Err(OnnxError::StyleParse(format!(
                "latent of {} values is not a whole number of {STYLE_DIM}-wide rows",
                values.len()
            )));
        }
        let rows = values
            .chunks_exact(STYLE_DIM)
            .map(|chunk| {
                let mut row = [0f32; STYLE_DIM];
                row.copy_from_slice(chunk);
                row
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for `idx`, clamped to the table.
    pub fn row(&self, idx: usize) -> &[f32] {
        let clamped = idx.min(self.rows.len().saturating_sub(1));
        &self.rows[clamped]
    }

    /// Element-wise mean of all rows.
    pub fn mean(&self) -> Vec<f32> {
        let mut mean = vec![0f32; STYLE_DIM];
        if self.rows.is_empty() {
            return mean;
        }
        for row in &self.rows {
            for (acc, v) in mean.iter_mut().zip(row) {
                *acc += v;
            }
        }
        let n = self.rows.len() as f32;
        mean.iter_mut().for_each(|v| *v /= n);
        mean
    }

    /// Full table as the latent, mean vector as the speaker embedding.
    pub fn to_conditioning(&self) -> Conditioning {
        Conditioning {
            latent: self.rows.iter().flatten().copied().collect(),
            speaker_embedding: self.mean(),
        }
    }
}

/// Parse numpy `.npy` bytes into style rows.
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<[f32; STYLE_DIM]>, OnnxError> {
    if data.len() < 10 {
        return Err(OnnxError::StyleParse(format!(
            "{name}: file too short ({} bytes)",
            data.len()
        )));
    }
    if &data[0..6] != b"\x93NUMPY" {
        return Err(OnnxError::StyleParse(format!("{name}: invalid numpy magic bytes")));
    }

    // v1 stores the header length as u16 at [8..10]; v2/v3 as u32 at [8..12].
    let (header_start, header_len) = match data[6] {
        1 => (10, u16::from_le_bytes([data[8], data[9]]) as usize),
        2 | 3 if data.len() >= 12 => (
            12,
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
        ),
        major => {
            return Err(OnnxError::StyleParse(format!(
                "{name}: unsupported npy version {major}"
            )))
        }
    };
    let data_offset = header_start + header_len;
    if data.len() < data_offset {
        return Err(OnnxError::StyleParse(format!(
            "{name}: header truncated (need {data_offset} bytes, got {})",
            data.len()
        )));
    }

    let header = String::from_utf8_lossy(&data[header_start..data_offset]);
    if !header.contains("<f4") {
        return Err(OnnxError::StyleParse(format!(
            "{name}: expected little-endian float32 data, header is {}",
            header.trim()
        )));
    }
    if header.contains("'fortran_order': True") {
        return Err(OnnxError::StyleParse(format!("{name}: fortran-ordered arrays are not supported")));
    }

    let float_data = &data[data_offset..];
    if float_data.len() % 4 != 0 {
        return Err(OnnxError::StyleParse(format!(
            "{name}: float data length {} is not a multiple of 4",
            float_data.len()
        )));
    }
    let n_floats = float_data.len() / 4;
    if n_floats == 0 || n_floats % STYLE_DIM != 0 {
        return Err(OnnxError::StyleParse(format!(
            "{name}: float count {n_floats} is not a multiple of {STYLE_DIM} (style vector dim)"
        )));
    }

    let rows = float_data
        .chunks_exact(STYLE_DIM * 4)
        .map(|row_bytes| {
            let mut row = [0f32; STYLE_DIM];
            for (value, bytes) in row.iter_mut().zip(row_bytes.chunks_exact(4)) {
                *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            row
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal v1 `.npy` encoding of `rows` x 256 float32 values.
    fn npy_bytes(rows: &[Vec<f32>]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {STYLE_DIM}), }}",
            rows.len()
        );
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut out = b"\x93NUMPY\x01\x00".to_vec();
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        for row in rows {
            for v in row {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn parses_rows_in_order() {
        let rows = vec![vec![0.5f32; STYLE_DIM], vec![-1.0f32; STYLE_DIM]];
        let parsed = parse_npy(&npy_bytes(&rows), "t").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0][0], 0.5);
        assert_eq!(parsed[1][STYLE_DIM - 1], -1.0);
    }

    #[test]
    fn rejects_wrong_dtype_and_width() {
        let mut bytes = npy_bytes(&[vec![0.0; STYLE_DIM]]);
        let pos = bytes.windows(3).position(|w| w == b"<f4").unwrap();
        bytes[pos + 2] = b'8';
        assert!(parse_npy(&bytes, "t").is_err());

        let mut short = npy_bytes(&[vec![0.0; STYLE_DIM]]);
        short.truncate(short.len() - 4);
        assert!(parse_npy(&short, "t").is_err());

        assert!(parse_npy(b"not numpy at all", "t").is_err());
    }

    #[test]
    fn rows_clamp_and_mean_averages() {
        let table = StyleTable::from_flat(
            &[vec![1.0f32; STYLE_DIM], vec![3.0f32; STYLE_DIM]].concat(),
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0)[0], 1.0);
        assert_eq!(table.row(99)[0], 3.0);
        assert!(table.mean().iter().all(|&v| (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn conditioning_round_trips_through_flat_latent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("style.npy");
        let rows: Vec<Vec<f32>> = (0..3).map(|i| vec![i as f32; STYLE_DIM]).collect();
        std::fs::write(&path, npy_bytes(&rows)).unwrap();

        let table = StyleTable::load(&path).unwrap();
        let conditioning = table.to_conditioning();
        assert_eq!(conditioning.latent.len(), 3 * STYLE_DIM);
        assert_eq!(conditioning.speaker_embedding.len(), STYLE_DIM);
        assert!((conditioning.speaker_embedding[0] - 1.0).abs() < 1e-6);
        assert_eq!(StyleTable::from_flat(&conditioning.latent).unwrap(), table);
    }

    #[test]
    fn partial_latents_are_rejected() {
        assert!(StyleTable::from_flat(&[]).is_err());
        assert!(StyleTable::from_flat(&[0.0; STYLE_DIM + 1]).is_err());
    }
}
