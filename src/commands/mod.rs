//! CLI command implementations
//!
//! Every command works on an emulated target: the target description gives
//! the regions, and a flash image file carries the flash contents from one
//! run to the next.

pub mod erase;
pub mod regions;
pub mod write;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tflash_core::flash::Target;
use tflash_core::layout::TargetLayout;
use tflash_dummy::{DummyConfig, DummyFlash};

use crate::error::CliError;

/// Load a target description file
pub fn load_layout(path: &Path) -> Result<TargetLayout, CliError> {
    TargetLayout::from_toml_file(path).map_err(|source| CliError::Layout {
        path: path.to_path_buf(),
        source,
    })
}

/// An emulated target together with the image file backing it
pub struct Session {
    pub target: Target,
    flash: DummyFlash,
    image: PathBuf,
}

impl Session {
    /// Build the emulated target and load the image into it
    pub fn open(target_file: &Path, image: &Path) -> Result<Self, CliError> {
        let layout = load_layout(target_file)?;
        let (target, flash) = DummyFlash::attach(&layout, DummyConfig::default())?;

        match fs::read(image) {
            Ok(data) => {
                let (start, end) = flash.span();
                flash.load_image(&data).map_err(|_| CliError::ImageSize {
                    path: image.to_path_buf(),
                    len: data.len(),
                    span: end - start,
                })?;
                log::debug!("Loaded {} bytes from {}", data.len(), image.display());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("{} does not exist, starting from erased flash", image.display());
            }
            Err(e) => return Err(CliError::io(image, e)),
        }

        Ok(Self {
            target,
            flash,
            image: image.to_path_buf(),
        })
    }

    /// End the flash session if one is still open
    pub fn complete(&mut self) -> Result<(), CliError> {
        if self.target.in_flash_mode() {
            self.target.complete()?;
        }
        Ok(())
    }

    /// Write the emulated flash contents back to the image file
    pub fn save(&self) -> Result<(), CliError> {
        let image = self.flash.dump_image()?;
        fs::write(&self.image, &image).map_err(|e| CliError::io(&self.image, e))?;
        log::debug!("Saved {} bytes to {}", image.len(), self.image.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::process;

    const TARGET: &str = r#"
[target]
name = "test"

[[region]]
name = "main"
start = 0x1000
length = 0x800
blocksize = 0x400
writesize = 4
writebufsize = 0x100

[[region]]
name = "data"
start = 0x2000
length = 0x100
blocksize = 0x100
writesize = 4
erased = 0x00
"#;

    fn scratch(name: &str) -> PathBuf {
        env::temp_dir().join(format!("tflash-{}-{}", process::id(), name))
    }

    #[test]
    fn test_session_image_round_trip() {
        let target_file = scratch("roundtrip.toml");
        let image = scratch("roundtrip.bin");
        fs::write(&target_file, TARGET).unwrap();
        let _ = fs::remove_file(&image);

        let mut session = Session::open(&target_file, &image).unwrap();
        session.target.write(0x1002, &[0x11, 0x22, 0x33]).unwrap();
        session.target.write(0x2000, &[0x44; 4]).unwrap();
        session.complete().unwrap();
        session.save().unwrap();

        let data = fs::read(&image).unwrap();
        assert_eq!(data.len(), 0x1100);
        assert_eq!(&data[..6], &[0xFF, 0xFF, 0x11, 0x22, 0x33, 0xFF]);
        assert!(data[0x800..0x1000].iter().all(|&b| b == 0xFF));
        assert_eq!(&data[0x1000..0x1006], &[0x44, 0x44, 0x44, 0x44, 0x00, 0x00]);

        let mut session = Session::open(&target_file, &image).unwrap();
        session.target.erase(0x1000, 1).unwrap();
        session.complete().unwrap();
        session.save().unwrap();

        let data = fs::read(&image).unwrap();
        assert!(data[..0x400].iter().all(|&b| b == 0xFF));
        assert_eq!(data[0x1000], 0x44);

        let _ = fs::remove_file(&target_file);
        let _ = fs::remove_file(&image);
    }

    #[test]
    fn test_session_rejects_oversized_image() {
        let target_file = scratch("oversized.toml");
        let image = scratch("oversized.bin");
        fs::write(&target_file, TARGET).unwrap();
        fs::write(&image, vec![0xFF; 0x1101]).unwrap();

        assert!(matches!(
            Session::open(&target_file, &image),
            Err(CliError::ImageSize { len: 0x1101, span: 0x1100, .. })
        ));

        let _ = fs::remove_file(&target_file);
        let _ = fs::remove_file(&image);
    }

    #[test]
    fn test_missing_target_description() {
        assert!(matches!(
            load_layout(&scratch("missing.toml")),
            Err(CliError::Layout { .. })
        ));
    }
}
