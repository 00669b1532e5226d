use std::path::Path;

/// Write `contents` to `path` by writing a sibling temp file and renaming it over the target.
///
/// Readers observe either the previous file or the complete new one. The parent
/// directory is created when missing.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			tokio::fs::create_dir_all(parent).await?;
		}
	}

	let file_name = path
		.file_name()
		.and_then(|f| f.to_str())
		.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
	let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

	tokio::fs::write(&tmp_path, contents).await?;
	if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
		let _ = tokio::fs::remove_file(&tmp_path).await;
		return Err(e);
	}
	Ok(())
}
