// Multipart upload processing for the relay
//
// This module extracts the `file` field of an upload request into memory,
// enforcing the configured size limit. Other fields are drained and ignored.

use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use log::{debug, info};

use crate::error::HandlerError;
use crate::models::AudioFile;

/// Name used when the client did not send a file name
const DEFAULT_FILE_NAME: &str = "audio";

/// Extract the `file` field of a multipart upload
///
/// Returns `Ok(None)` when the form has no `file` field.
pub async fn extract_upload(
    mut form: Multipart,
    max_size: usize,
) -> Result<Option<AudioFile>, HandlerError> {
    let mut upload: Option<AudioFile> = None;

    while let Ok(Some(mut field)) = form.try_next().await {
        let content_disposition = field.content_disposition();
        let field_name = content_disposition
            .and_then(|cd| cd.get_name().map(|name| name.to_string()))
            .unwrap_or_default();

        if field_name != "file" || upload.is_some() {
            debug!("Skipping form field '{}'", field_name);
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| {
                    HandlerError::form_error(format!("Error reading field {}: {}", field_name, e))
                })?;
            }
            continue;
        }

        let file_name = content_disposition
            .and_then(|cd| cd.get_filename().map(|name| name.to_string()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| {
                HandlerError::form_error(format!("Error processing file upload: {}", e))
            })?;

            if data.len() + chunk.len() > max_size {
                return Err(HandlerError::FileTooLarge(data.len() + chunk.len(), max_size));
            }
            data.extend_from_slice(&chunk);
        }

        info!("Received upload {} ({} bytes)", file_name, data.len());
        upload = Some(AudioFile {
            name: file_name,
            content_type,
            data,
        });
    }

    Ok(upload)
}
