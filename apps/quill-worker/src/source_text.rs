use time::format_description::well_known::Rfc3339;

use quill_storage::models::Note;

use crate::{Error, Result};

/// Point-in-time text that is embedded for a note.
pub fn render_source_text(note: &Note) -> Result<String> {
	let created_at = note
		.created_at
		.format(&Rfc3339)
		.map_err(|err| Error::SourceText { message: err.to_string() })?;
	let notebook = note.notebook_name.as_deref().unwrap_or("-");

	Ok(format!(
		"Notebook: {notebook}\nTitle: {}\nContent: {}\nCreated at: {created_at}",
		note.title, note.content
	))
}
