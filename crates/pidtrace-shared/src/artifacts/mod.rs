use log::debug;
use serde::Serialize;
use std::io::Write;

mod process_snapshot;
mod trace;

pub use process_snapshot::*;
pub use trace::*;

pub trait ArtifactExt
where
    Self: Sized + Serialize,
{
    /// WARNING: This doesn't support generic types
    fn name() -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("Artifact")
    }

    fn encode_to_writer<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        let encoded = rmp_serde::to_vec_named(self)?;
        writer.write_all(&encoded)?;
        Ok(())
    }

    fn save_file_to<P: AsRef<std::path::Path>>(
        &self,
        folder: P,
        filename: &str,
    ) -> anyhow::Result<()> {
        std::fs::create_dir_all(folder.as_ref())?;
        let file = std::fs::File::create(folder.as_ref().join(filename))?;
        let mut writer = std::io::BufWriter::new(file);
        self.encode_to_writer(&mut writer)?;
        writer.flush()?;

        debug!("Saved {} to {:?}", Self::name(), folder.as_ref());
        Ok(())
    }

    fn save_to<P: AsRef<std::path::Path>>(&self, folder: P) -> anyhow::Result<()> {
        self.save_file_to(folder, &format!("{}.msgpack", Self::name()))
    }

    fn save_with_pid_to<P: AsRef<std::path::Path>>(
        &self,
        folder: P,
        pid: u32,
    ) -> anyhow::Result<()> {
        self.save_file_to(folder, &format!("{pid}.{}.msgpack", Self::name()))
    }
}
