use crate::{
    app::AppState,
    asset::{ingest::UploadedFile, AudioCategory},
    error::{CallError, CallResult},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    friendly_name: String,
    category: String,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("audiofile") => {
                let file_name = field.file_name().unwrap_or("audio.mp3").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("friendlyName") => form.friendly_name = field.text().await?,
            Some("category") => form.category = field.text().await?,
            _ => {}
        }
    }
    Ok(form)
}

pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };
    match state
        .ingest
        .ingest(form.file, &form.friendly_name, &form.category)
        .await
    {
        Ok(asset) => Json(json!({
            "message": "Asset created successfully",
            "assetLink": asset.asset_link,
            "asset": asset,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn play_audio(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> CallResult<Json<Value>> {
    let category: AudioCategory = category.parse()?;
    let asset_link = state
        .catalog
        .resolve_by_category(category)
        .await
        .map_err(|_| CallError::AudioCategoryEmpty(category.to_string()))?;
    Ok(Json(json!({
        "category": category,
        "assetLink": asset_link,
    })))
}

pub async fn list_assets(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> CallResult<Json<Value>> {
    let category: AudioCategory = category.parse()?;
    let assets = state.catalog.list_by_category(category).await;
    Ok(Json(json!({ "assets": assets })))
}
