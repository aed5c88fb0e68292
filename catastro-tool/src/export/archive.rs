//! Archive `<ref>_completo.tar.bz2` regroupant les résultats d'une parcelle

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use tracing::info;

use afecciones::AfeccionError;

use super::OutputLayout;

/// Archive le répertoire `<output>/<ref>` dans `<output>/<ref>_completo.tar.bz2`
pub fn bundle_reference(layout: &OutputLayout, reference: &str) -> Result<PathBuf, AfeccionError> {
    let source = layout.reference_dir(reference);
    if !source.is_dir() {
        return Err(AfeccionError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", source.display()),
        )));
    }

    let target = layout.root().join(format!("{}_completo.tar.bz2", reference));
    let file = File::create(&target)?;
    let encoder = BzEncoder::new(BufWriter::new(file), Compression::default());

    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(reference, &source)?;
    let mut writer = builder.into_inner()?.finish()?;
    writer.flush()?;

    info!(reference, archive = %target.display(), "Bundle written");
    Ok(target)
}
