//! Loading precompiled shader binaries from disk.
//!
//! The bytes are handed to the backend untouched; rejecting malformed
//! bytecode is the backend's job.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to open shader file {}: {source}", .path.display())]
    Open { path: PathBuf, source: std::io::Error },
    #[error("failed to read shader file {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to read shader file {}: expected {expected} bytes, got {read}", .path.display())]
    Truncated { path: PathBuf, expected: u64, read: u64 },
}

/// Read a shader binary in full.
pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ShaderError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| ShaderError::Open { path: path.to_path_buf(), source })?;
    let expected = file
        .metadata()
        .map_err(|source| ShaderError::Read { path: path.to_path_buf(), source })?
        .len();

    let mut bytes = Vec::with_capacity(expected as usize);
    file.read_to_end(&mut bytes)
        .map_err(|source| ShaderError::Read { path: path.to_path_buf(), source })?;
    if (bytes.len() as u64) < expected {
        return Err(ShaderError::Truncated { path: path.to_path_buf(), expected, read: bytes.len() as u64 });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_whole_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let payload: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        f.write_all(&payload).unwrap();
        let bytes = load_spirv(f.path()).unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    fn missing_file_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_spirv(dir.path().join("double.spv")).unwrap_err();
        assert!(matches!(err, ShaderError::Open { .. }));
        assert!(err.to_string().contains("double.spv"));
    }

    #[test]
    fn directory_is_not_a_shader() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_spirv(dir.path()).is_err());
    }

    #[test]
    fn shipped_binary_is_spirv() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../shaders/double.spv");
        let bytes = load_spirv(&path).unwrap();
        assert_eq!(bytes.len() % 4, 0);
        let magic: u32 = bytemuck::pod_read_unaligned(&bytes[..4]);
        assert_eq!(magic, 0x0723_0203);
        #[cfg(feature = "vulkan")]
        {
            let words = ash::util::read_spv(&mut std::io::Cursor::new(&bytes)).unwrap();
            assert_eq!(words.len(), bytes.len() / 4);
        }
    }

    #[test]
    fn content_is_not_validated() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"not spir-v").unwrap();
        assert_eq!(load_spirv(f.path()).unwrap(), b"not spir-v");
    }
}
