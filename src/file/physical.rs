//! Memory-mapped file backend for [`crate::file::PeFile`].

use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// Backend over a read-only memory map of a file on disk.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Open and map the file at `path`
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file can not be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // The mapping is read-only. Modifying the file while it is mapped is undefined behaviour,
        // which is accepted for an analysis tool working on static inputs.
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn physical_maps_file() {
        let path = std::env::temp_dir().join(format!("aotscope_physical_{}", std::process::id()));
        {
            let mut file = fs::File::create(&path).unwrap();
            file.write_all(&[0x4D, 0x5A, 0x90, 0x00]).unwrap();
        }

        let physical = Physical::new(&path).unwrap();
        assert_eq!(physical.len(), 4);
        assert_eq!(physical.data_slice(0, 2).unwrap(), &[0x4D, 0x5A]);
        assert!(physical.data_slice(2, 3).is_err());

        drop(physical);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn physical_missing_file() {
        let result = Physical::new("/this/path/does/not/exist.exe");
        assert!(matches!(result, Err(FileError(_))));
    }
}
