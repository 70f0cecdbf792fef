// src/gateway.rs

use crate::admission::{AdmissionController, AdmissionOptions, AdmissionUpdate};
use crate::error::{AppError, Result};
use crate::executor::{RequestClass, RequestContext, RequestExecutor};
use crate::token::Token;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

const VIDEO_API_PREFIX: &str = "api/veo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Landscape,
    Portrait,
}

impl AspectRatio {
    fn video_value(self) -> &'static str {
        match self {
            Self::Landscape => "VIDEO_ASPECT_RATIO_LANDSCAPE",
            Self::Portrait => "VIDEO_ASPECT_RATIO_PORTRAIT",
        }
    }

    fn image_value(self) -> &'static str {
        match self {
            Self::Landscape => "IMAGE_ASPECT_RATIO_LANDSCAPE",
            Self::Portrait => "IMAGE_ASPECT_RATIO_PORTRAIT",
        }
    }
}

/// One video generation request. When `start_image_media_id` is set the
/// image-to-video model family is used instead of text-to-video.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub seed: Option<u32>,
    pub start_image_media_id: Option<String>,
}

/// Operations handle returned by the backend, plus the token that won.
#[derive(Debug)]
pub struct GenerationStarted {
    pub operations: Vec<Value>,
    pub token_used: Token,
}

#[derive(Debug)]
pub struct UploadedImage {
    pub media_id: String,
    pub token_used: Token,
}

/// Typed front door over one video backend's proxy endpoints.
///
/// Generation calls pass through the admission controller first; status
/// polls and uploads are cheap and go straight to the executor.
pub struct GenerationGateway {
    admission: AdmissionController,
    executor: RequestExecutor,
    base_url: Url,
}

impl GenerationGateway {
    pub fn new(admission: AdmissionController, executor: RequestExecutor, base_url: Url) -> Self {
        Self {
            admission,
            executor,
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{VIDEO_API_PREFIX}/{path}"))
            .map_err(AppError::from)
    }

    /// Model key table from the backend: i2v vs t2v crossed with aspect
    /// ratio, fast tier only.
    fn video_model_key(request: &VideoRequest) -> &'static str {
        match (request.start_image_media_id.is_some(), request.aspect_ratio) {
            (true, AspectRatio::Landscape) => "veo_3_1_i2v_s_fast_landscape_ultra",
            (true, AspectRatio::Portrait) => "veo_3_1_i2v_s_fast_portrait_ultra",
            (false, AspectRatio::Landscape) => "veo_3_1_t2v_fast_ultra",
            (false, AspectRatio::Portrait) => "veo_3_1_t2v_fast_portrait_ultra",
        }
    }

    fn build_video_body(request: &VideoRequest) -> Value {
        let seed = request
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..2_147_483_647));
        let mut entry = json!({
            "aspectRatio": request.aspect_ratio.video_value(),
            "seed": seed,
            "textInput": { "prompt": request.prompt },
            "videoModelKey": Self::video_model_key(request),
            "metadata": { "sceneId": Uuid::new_v4().to_string() },
        });
        if let Some(media_id) = &request.start_image_media_id {
            entry["startImage"] = json!({ "mediaId": media_id });
        }
        json!({
            "clientContext": {
                "tool": "PINHOLE",
                "userPaygateTier": "PAYGATE_TIER_TWO",
            },
            "requests": [entry],
        })
    }

    /// Starts a video generation. Acquires a slot on this backend first,
    /// then dispatches with the session's personal token (or `token_override`
    /// for one-off admin calls).
    #[instrument(level = "debug", skip_all, fields(aspect = ?request.aspect_ratio))]
    pub async fn generate_video(
        &self,
        request: &VideoRequest,
        token_override: Option<&Token>,
        admission_opts: AdmissionOptions,
        on_update: impl FnMut(AdmissionUpdate) + Send,
    ) -> Result<GenerationStarted> {
        let is_i2v = request.start_image_media_id.is_some();
        let path = if is_i2v { "generate-i2v" } else { "generate-t2v" };
        let tag = if is_i2v {
            "VEO I2V GENERATE"
        } else {
            "VEO T2V GENERATE"
        };

        self.admission
            .acquire_slot(self.base_url.as_str(), admission_opts, on_update)
            .await?;

        let body = Self::build_video_body(request);
        let ctx = RequestContext::new(tag, RequestClass::Generation);
        let execution = self
            .executor
            .execute(self.endpoint(path)?, &body, &ctx, token_override)
            .await?;

        let operations = execution
            .data
            .get("operations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(operations = operations.len(), "Generation accepted by backend");

        Ok(GenerationStarted {
            operations,
            token_used: execution.token_used,
        })
    }

    /// Polls operation status with the exact token that started the
    /// generation. Unmetered.
    pub async fn check_status(&self, operations: &[Value], token: &Token) -> Result<Value> {
        let body = json!({ "operations": operations });
        let ctx = RequestContext::new("VEO STATUS", RequestClass::Status);
        let execution = self
            .executor
            .execute(self.endpoint("status")?, &body, &ctx, Some(token))
            .await?;
        Ok(execution.data)
    }

    /// Uploads a start image for image-to-video. Unmetered.
    pub async fn upload_image(
        &self,
        base64_image: &str,
        mime_type: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<UploadedImage> {
        let body = json!({
            "imageInput": {
                "rawImageBytes": base64_image,
                "mimeType": mime_type,
                "isUserUploaded": true,
                "aspectRatio": aspect_ratio.image_value(),
            },
            "clientContext": {
                "sessionId": Uuid::new_v4().to_string(),
                "tool": "ASSET_MANAGER",
            },
        });
        let ctx = RequestContext::new("VEO UPLOAD", RequestClass::Upload);
        let execution = self
            .executor
            .execute(self.endpoint("upload")?, &body, &ctx, None)
            .await?;

        // The backend answers with either the nested or the flat shape.
        let media_id = execution
            .data
            .get("mediaGenerationId")
            .and_then(|v| v.get("mediaGenerationId"))
            .and_then(Value::as_str)
            .or_else(|| execution.data.get("mediaId").and_then(Value::as_str))
            .map(str::to_string);

        match media_id {
            Some(media_id) => Ok(UploadedImage {
                media_id,
                token_used: execution.token_used,
            }),
            None => Err(AppError::RequestFailure {
                status: 200,
                message: "Upload succeeded but no mediaId returned".to_string(),
            }),
        }
    }
}
