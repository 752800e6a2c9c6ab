/// File Upload Routes
///
/// Uploads are streamed to `UPLOAD_DIR` under a fresh UUID name that keeps
/// only a sanitized form of the original extension. The client-supplied name
/// never reaches the filesystem.

use std::path::Path;

use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::configuration::UploadSettings;
use crate::error::{AppError, ValidationError};
use crate::middleware::ActiveIdentity;
use crate::models::NewFileUpload;
use crate::store::Stores;

const FILE_FIELD: &str = "file";
const MAX_EXTENSION_LEN: usize = 10;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn malformed(e: MultipartError) -> AppError {
    ValidationError::MalformedBody(e.to_string()).into()
}

/// Lowercased ASCII-alphanumeric extension of the client's filename, if it
/// has a usable one.
pub fn sanitized_extension(original: &str) -> Option<String> {
    let ext = Path::new(original).extension()?.to_str()?;
    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    (!ext.is_empty()).then_some(ext)
}

pub fn stored_filename(original: Option<&str>) -> String {
    match original.and_then(sanitized_extension) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}

/// Copy one multipart field to `path`, failing once `max_bytes` is exceeded.
/// A partially written file is removed on failure.
async fn save_field(field: &mut Field, path: &Path, max_bytes: usize) -> Result<(), AppError> {
    let result = write_field(field, path, max_bytes).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
        }
    }
    result
}

async fn write_field(field: &mut Field, path: &Path, max_bytes: usize) -> Result<(), AppError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0usize;

    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
        written += chunk.len();
        if written > max_bytes {
            return Err(ValidationError::TooLong(FILE_FIELD.to_string(), max_bytes).into());
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// POST /files/upload
///
/// # Errors
/// - 400: No `file` field, malformed multipart body, or file too large
pub async fn upload_file(
    identity: ActiveIdentity,
    mut payload: Multipart,
    stores: web::Data<Stores>,
    uploads: web::Data<UploadSettings>,
) -> Result<HttpResponse, AppError> {
    let ActiveIdentity(identity) = identity;

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        if field.name() != FILE_FIELD {
            continue;
        }

        let original = field
            .content_disposition()
            .get_filename()
            .map(str::to_owned);
        let file_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_owned())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let filename = stored_filename(original.as_deref());

        tokio::fs::create_dir_all(&uploads.dir).await?;
        save_field(&mut field, &uploads.dir.join(&filename), uploads.max_bytes).await?;

        let record = stores
            .files
            .create(NewFileUpload {
                filename,
                file_type,
                owner_id: identity.user_id(),
            })
            .await?;

        tracing::info!(
            user_id = %identity.user_id(),
            file_id = %record.id,
            file_type = %record.file_type,
            "File uploaded"
        );
        return Ok(HttpResponse::Created().json(record));
    }

    Err(ValidationError::EmptyField(FILE_FIELD.to_string()).into())
}

/// GET /files
pub async fn list_files(
    identity: ActiveIdentity,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AppError> {
    let files = stores.files.list_for_owner(identity.0.user_id()).await?;
    Ok(HttpResponse::Ok().json(files))
}
