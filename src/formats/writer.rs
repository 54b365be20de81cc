//! Fingerprinted, checksummed, atomic artifact writer and its reading
//! counterpart.

use crc::{Crc, CRC_64_GO_ISO};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{ExtractError, Result};

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Writes fingerprint + payload + CRC-64 footer to `<path>.tmp`, renamed
/// to `path` on `finish`. Dropping without finishing removes the temp
/// file, which is what makes cancellation and write errors clean.
pub struct ArtifactWriter {
    writer: Option<BufWriter<File>>,
    digest: crc::Digest<'static, u64>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl ArtifactWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let tmp_path = temp_path(path);
        let file = File::create(&tmp_path)?;
        let mut writer = Self {
            writer: Some(BufWriter::new(file)),
            digest: CRC64.digest(),
            tmp_path,
            final_path: path.to_path_buf(),
        };
        writer.write_u64(super::fingerprint())?;
        Ok(writer)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.digest.update(bytes);
        self.writer
            .as_mut()
            .expect("writer already finished")
            .write_all(bytes)?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Length-prefixed string (u32 length + bytes).
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn finish(mut self) -> Result<()> {
        let digest = std::mem::replace(&mut self.digest, CRC64.digest());
        let checksum = digest.finalize();
        let mut writer = self.writer.take().expect("writer already finished");
        writer.write_all(&checksum.to_le_bytes())?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(())
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Reads an artifact back, verifying fingerprint and checksum up front.
/// Mostly exercised by tests and by downstream tools.
pub struct ArtifactReader {
    payload: Vec<u8>,
    cursor: usize,
}

impl ArtifactReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)
            .map_err(|e| ExtractError::Input(format!("{}: {e}", path.display())))?
            .read_to_end(&mut bytes)?;

        if bytes.len() < 16 {
            return Err(ExtractError::Input(format!(
                "{}: truncated artifact",
                path.display()
            )));
        }

        let fingerprint = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        if fingerprint != super::fingerprint() {
            return Err(ExtractError::Input(format!(
                "{}: fingerprint mismatch (schema change or foreign file)",
                path.display()
            )));
        }

        let footer_at = bytes.len() - 8;
        let stored = u64::from_le_bytes(bytes[footer_at..].try_into().unwrap());
        let computed = CRC64.checksum(&bytes[..footer_at]);
        if stored != computed {
            return Err(ExtractError::Input(format!(
                "{}: checksum mismatch",
                path.display()
            )));
        }

        Ok(Self {
            payload: bytes[8..footer_at].to_vec(),
            cursor: 0,
        })
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        if self.cursor + len > self.payload.len() {
            return Err(ExtractError::Input("unexpected end of artifact".into()));
        }
        let slice = &self.payload[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ExtractError::Input("artifact string is not utf-8".into()))
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.cursor
    }
}
