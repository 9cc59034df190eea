use crate::{config::Config, errors::ApiError, models::FileRecord, registry::Registry};
use crate::ws::server::{Broadcaster, FileEvent, Publish};
use actix::Addr;
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, web};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use futures_util::TryStreamExt as _;

#[derive(serde::Serialize)]
pub struct UploadResp {
    pub success: bool,
    pub file: FileRecord,
}

/// Broadcasts only after the registry confirms the write.
pub async fn upload_file(
    cfg: web::Data<Config>,
    registry: web::Data<Registry>,
    srv: web::Data<Addr<Broadcaster>>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut incoming: Option<(String, Vec<u8>)> = None;
    while let Some(field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart".into()))?
    {
        incoming = Some(read_file_field(&cfg, field).await?);
        break;
    }
    let (display_name, data) = incoming.ok_or(ApiError::BadRequest("no file part".into()))?;

    let record = registry.register(&display_name, &data).await?;
    srv.do_send(Publish { event: FileEvent::Added { file: record.clone() } });
    Ok(HttpResponse::Ok().json(UploadResp { success: true, file: record }))
}

async fn read_file_field(
    cfg: &Config,
    mut field: actix_multipart::Field,
) -> Result<(String, Vec<u8>), ApiError> {
    let content_disposition = field.content_disposition().cloned();
    let display_name = content_disposition
        .and_then(|cd| cd.get_filename().map(|s| s.to_string()))
        .unwrap_or_else(|| "upload.bin".into());
    let mut data: Vec<u8> = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("upload read error".into()))?
    {
        data.extend_from_slice(&chunk);
        if data.len() > cfg.max_upload_size {
            return Err(ApiError::BadRequest("file too large".into()));
        }
    }
    Ok((display_name, data))
}

pub async fn list_files(registry: web::Data<Registry>) -> HttpResponse {
    HttpResponse::Ok().json(registry.list().await)
}

/// Nothing is broadcast unless the registry confirms the removal.
pub async fn delete_file(
    registry: web::Data<Registry>,
    srv: web::Data<Addr<Broadcaster>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let storage_key = registry.delete(&path.into_inner()).await?;
    srv.do_send(Publish { event: FileEvent::Removed { storage_key } });
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

pub async fn get_file(
    registry: web::Data<Registry>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (file_path, display_name) = registry.resolve(&path.into_inner()).await?;
    let named = actix_files::NamedFile::open_async(file_path).await
        .map_err(|_| ApiError::NotFound)?
        .use_last_modified(true)
        .prefer_utf8(true)
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Inline,
            parameters: vec![DispositionParam::Filename(display_name)],
        });
    Ok(named.into_response(&req))
}
