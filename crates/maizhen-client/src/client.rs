//! 后端HTTP客户端
//!
//! 所有请求都携带Bearer令牌；收到401时立即清除会话并返回
//! `MaizhenError::Unauthorized`，不再处理该响应。

use async_trait::async_trait;
use maizhen_core::utils::truncate_chars;
use maizhen_core::{
    AnalysisRequest, AnalysisResult, AnnotationPayload, ImageUpload, MaizhenError, PatientInfo,
    PulseGrid, RecognitionResponse, RecordDetail, RecordDraft, Result, SaveReceipt,
    SimilarRecord,
};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{AnalysisApi, PrescriptionApi, RecordApi};
use crate::session::CredentialStore;

/// 错误响应原文保留的最大字符数
const ERROR_BODY_LIMIT: usize = 200;

/// 后端客户端
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            credentials,
        }
    }

    /// 拼接完整URL，绝对地址原样返回
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// 发送认证请求
    ///
    /// 非2xx响应转换为 `Server` 错误；401 清除会话后返回 `Unauthorized`。
    pub async fn authenticated_request(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.credentials.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| MaizhenError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Received 401 from {}, clearing session", response.url());
            self.credentials.clear();
            return Err(MaizhenError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MaizhenError::Server {
                status: status.as_u16(),
                message: extract_error_message(status.as_u16(), &body),
            });
        }

        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|e| MaizhenError::Network(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self
            .authenticated_request(self.client.get(self.url(path)))
            .await?;
        Self::read_json(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", path);
        let response = self
            .authenticated_request(self.client.post(self.url(path)).json(body))
            .await?;
        Self::read_json(response).await
    }

    fn image_part(image: &ImageUpload) -> Result<Part> {
        Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| MaizhenError::Validation(format!("无效的图片类型 {}: {}", image.mime_type, e)))
    }
}

/// 从错误响应中提取提示信息
///
/// 依次尝试JSON中的 `detail`、`error`、`message` 字段；无法解析时
/// 使用截断后的原文；原文为空时回退到 `HTTP {status}`。
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["detail", "error", "message"] {
            match map.get(field) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(serde_json::Value::Null) | None => continue,
                Some(other) => return truncate_chars(&other.to_string(), ERROR_BODY_LIMIT),
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        truncate_chars(trimmed, ERROR_BODY_LIMIT)
    }
}

#[async_trait]
impl RecordApi for ApiClient {
    async fn get_patient(&self, patient_id: i64) -> Result<PatientInfo> {
        self.get_json(&format!("/api/patients/{}", patient_id)).await
    }

    async fn get_record(&self, record_id: i64) -> Result<RecordDetail> {
        self.get_json(&format!("/api/records/{}", record_id)).await
    }

    async fn save_record(&self, draft: &RecordDraft) -> Result<SaveReceipt> {
        debug!("POST /api/records/save");
        let response = self
            .authenticated_request(self.client.post(self.url("/api/records/save")).json(draft))
            .await?;
        // 保存接口的返回体不固定，解析失败时只保留成功状态
        let body = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    async fn delete_record(&self, record_id: i64) -> Result<()> {
        let path = format!("/api/records/{}", record_id);
        debug!("DELETE {}", path);
        self.authenticated_request(self.client.delete(self.url(&path)))
            .await?;
        Ok(())
    }

    async fn update_analysis(&self, record_id: i64, analysis: &AnalysisResult) -> Result<()> {
        let path = format!("/api/records/{}/analysis", record_id);
        debug!("PATCH {}", path);
        self.authenticated_request(
            self.client
                .patch(self.url(&path))
                .json(&json!({ "ai_analysis": analysis })),
        )
        .await?;
        Ok(())
    }

    async fn search_similar(&self, grid: &PulseGrid) -> Result<Vec<SimilarRecord>> {
        self.post_json("/api/records/search_similar", &json!({ "pulse_grid": grid }))
            .await
    }
}

#[async_trait]
impl AnalysisApi for ApiClient {
    async fn generate_report(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        self.post_json("/api/analyze/llm/report", request).await
    }
}

#[async_trait]
impl PrescriptionApi for ApiClient {
    async fn recognize(&self, image: &ImageUpload) -> Result<RecognitionResponse> {
        debug!("POST /api/prescription/recognize ({} bytes)", image.bytes.len());
        let form = Form::new().part("file", Self::image_part(image)?);
        let response = self
            .authenticated_request(
                self.client
                    .post(self.url("/api/prescription/recognize"))
                    .multipart(form),
            )
            .await?;
        Self::read_json(response).await
    }

    async fn save_annotation(&self, image: &ImageUpload, annotations: &AnnotationPayload) -> Result<()> {
        debug!(
            "POST /api/prescription/save-annotation ({} boxes)",
            annotations.medicine_boxes.len()
        );
        let form = Form::new()
            .part("file", Self::image_part(image)?)
            .text("annotations", serde_json::to_string(annotations)?);
        self.authenticated_request(
            self.client
                .post(self.url("/api/prescription/save-annotation"))
                .multipart(form),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryCredentials;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    const TOKEN: &str = "t0ken";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", TOKEN))
            .unwrap_or(false)
    }

    async fn record(Path(id): Path<i64>, headers: HeaderMap) -> AxumResponse {
        if !authorized(&headers) || id == 2 {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        Json(serde_json::json!({
            "medical_record": {"complaint": "头痛", "prescription": "川芎 6g\n白芷 3g", "note": ""},
            "pulse_grid": {"left-cun-fu": "浮"},
            "permissions": {"can_edit": false, "can_delete": false, "is_owner": false, "owner_name": "张医生"}
        }))
        .into_response()
    }

    async fn delete_record(Path(_id): Path<i64>) -> AxumResponse {
        (
            AxumStatus::FORBIDDEN,
            Json(serde_json::json!({"detail": "无权删除他人创建的记录"})),
        )
            .into_response()
    }

    async fn search_similar() -> AxumResponse {
        (AxumStatus::INTERNAL_SERVER_ERROR, "x".repeat(500)).into_response()
    }

    async fn patient() -> AxumResponse {
        AxumStatus::NOT_FOUND.into_response()
    }

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/api/records/:id", get(record).delete(delete_record))
            .route("/api/records/search_similar", post(search_similar))
            .route("/api/patients/:id", get(patient));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(extract_error_message(400, r#"{"detail": "标注数据格式错误"}"#), "标注数据格式错误");
        assert_eq!(extract_error_message(500, r#"{"error": "boom"}"#), "boom");
        assert_eq!(extract_error_message(502, ""), "HTTP 502");
        assert_eq!(extract_error_message(500, "<html>bad gateway</html>"), "<html>bad gateway</html>");
        assert_eq!(extract_error_message(500, &"长".repeat(300)).chars().count(), 200);
        // FastAPI 校验错误的 detail 是数组
        assert!(extract_error_message(422, r#"{"detail": [{"loc": ["body"]}]}"#).contains("loc"));
    }

    #[tokio::test]
    async fn test_bearer_token_and_record_decoding() {
        let base = spawn_server().await;
        let credentials = Arc::new(MemoryCredentials::new(Some(TOKEN.to_string())));
        let client = ApiClient::new(base, credentials.clone());

        let detail = client.get_record(1).await.unwrap();
        let record = detail.medical_record.unwrap();
        assert_eq!(record.complaint, "头痛");
        assert_eq!(record.prescription, "川芎 6g\n白芷 3g");
        assert!(!detail.permissions.unwrap().can_edit);
        assert!(!detail.pulse_grid.unwrap().is_empty());
        assert_eq!(credentials.token().as_deref(), Some(TOKEN));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session() {
        let base = spawn_server().await;
        let credentials = Arc::new(MemoryCredentials::new(Some(TOKEN.to_string())));
        let client = ApiClient::new(base, credentials.clone());

        let err = client.get_record(2).await.unwrap_err();
        assert!(err.requires_login());
        assert!(credentials.token().is_none());
    }

    #[tokio::test]
    async fn test_server_errors_are_extracted() {
        let base = spawn_server().await;
        let credentials = Arc::new(MemoryCredentials::new(Some(TOKEN.to_string())));
        let client = ApiClient::new(base, credentials);

        match client.delete_record(3).await {
            Err(MaizhenError::Server { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "无权删除他人创建的记录");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        match client.search_similar(&PulseGrid::new()).await {
            Err(MaizhenError::Server { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message.len(), 200);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        match client.get_patient(9).await {
            Err(MaizhenError::Server { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "HTTP 404");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        // 绑定后立即释放端口，连接会被拒绝
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(format!("http://{}", addr), Arc::new(MemoryCredentials::default()));
        let err = client.get_record(1).await.unwrap_err();
        assert!(matches!(err, MaizhenError::Network(_)));
    }
}
