//! The backend HTTP control plane. One `reqwest::Client` per backend,
//! every accessor threading the same credentials and base host.

use fleetcast_types::{ClientId, Credentials};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// `GET /prompt` liveness + queue status response shape.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: Value,
}

/// `POST /prompt` response.
#[derive(Debug, Clone, Deserialize)]
pub struct QueuePromptResponse {
    pub prompt_id: String,
    pub number: u64,
    #[serde(default)]
    pub node_errors: Value,
}

/// `GET /queue` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<Value>,
    #[serde(default)]
    pub queue_pending: Vec<Value>,
}

/// Outcome of `uploadImage`/`uploadMask`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResult {
    #[serde(flatten)]
    pub info: Value,
}

#[derive(Debug, Clone, Serialize)]
struct QueuePromptBody<'a> {
    client_id: &'a str,
    prompt: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    front: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    number: Option<i64>,
}

/// Where to submit a prompt within the backend's own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// Append to the back of the queue.
    Back,
    /// Jump to the front.
    Front,
    /// A specific numeric position.
    At(i64),
}

/// The HTTP accessor surface for one backend, rooted at `host`.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client_id: ClientId,
    host: String,
    http: reqwest::Client,
    credentials: Credentials,
}

impl HttpApi {
    pub fn new(client_id: ClientId, host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client_id,
            host: host.into(),
            http: reqwest::Client::new(),
            credentials,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.credentials.apply(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.credentials.apply(self.http.post(self.url(path)))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = builder.send().await.map_err(|e| ClientError::Request {
            client_id: self.client_id.clone(),
            source: e,
        })?;
        self.decode_json(response).await
    }

    async fn decode_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::Auth {
                client_id: self.client_id.clone(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                client_id: self.client_id.clone(),
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(|e| ClientError::Request {
            client_id: self.client_id.clone(),
            source: e,
        })
    }

    /// `GET /prompt`: liveness probe plus queue status.
    pub async fn get_prompt_status(&self) -> Result<QueueStatus, ClientError> {
        self.send_json(self.get("/prompt")).await
    }

    /// `POST /prompt`.
    pub async fn queue_prompt(
        &self,
        position: QueuePosition,
        workflow: &Value,
    ) -> Result<QueuePromptResponse, ClientError> {
        let (front, number) = match position {
            QueuePosition::Back => (None, None),
            QueuePosition::Front => (Some(true), None),
            QueuePosition::At(n) => (None, Some(n)),
        };
        let body = QueuePromptBody {
            client_id: &self.client_id.0,
            prompt: workflow,
            front,
            number,
        };
        self.send_json(self.post("/prompt").json(&body)).await
    }

    /// `GET /queue`.
    pub async fn get_queue(&self) -> Result<QueueSnapshot, ClientError> {
        self.send_json(self.get("/queue")).await
    }

    /// `GET /history?max_items=N`.
    pub async fn get_histories(&self, max_items: u64) -> Result<Value, ClientError> {
        self.send_json(self.get(&format!("/history?max_items={max_items}")))
            .await
    }

    /// `GET /history/{promptId}`.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ClientError> {
        self.send_json(self.get(&format!("/history/{prompt_id}")))
            .await
    }

    /// `GET /system_stats`.
    pub async fn get_system_stats(&self) -> Result<Value, ClientError> {
        self.send_json(self.get("/system_stats")).await
    }

    /// `GET /object_info[/{nodeName}]`.
    pub async fn get_node_defs(&self, node_name: Option<&str>) -> Result<Value, ClientError> {
        let path = match node_name {
            Some(name) => format!("/object_info/{name}"),
            None => "/object_info".to_string(),
        };
        self.send_json(self.get(&path)).await
    }

    /// Extract the enum slot `input.required.{field}[0]` for `node_name`
    /// from `GET /object_info/{node_name}`, returning an empty list rather
    /// than failing if the node is absent.
    async fn extract_enum(&self, node_name: &str, field: &str) -> Result<Vec<String>, ClientError> {
        let defs = self.get_node_defs(Some(node_name)).await?;
        let options = defs
            .get(node_name)
            .and_then(|n| n.get("input"))
            .and_then(|i| i.get("required"))
            .and_then(|r| r.get(field))
            .and_then(|f| f.get(0))
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(options)
    }

    pub async fn get_checkpoints(&self) -> Result<Vec<String>, ClientError> {
        self.extract_enum("CheckpointLoaderSimple", "ckpt_name").await
    }

    pub async fn get_loras(&self) -> Result<Vec<String>, ClientError> {
        self.extract_enum("LoraLoader", "lora_name").await
    }

    /// `GET /embeddings`.
    pub async fn get_embeddings(&self) -> Result<Vec<String>, ClientError> {
        self.send_json(self.get("/embeddings")).await
    }

    pub async fn get_sampler_info(&self) -> Result<Value, ClientError> {
        self.get_node_defs(Some("KSampler")).await
    }

    /// `POST /upload/image` multipart.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        subfolder: Option<String>,
        overwrite: Option<bool>,
    ) -> Result<UploadResult, ClientError> {
        let mut form = reqwest::multipart::Form::new().part(
            "image",
            reqwest::multipart::Part::bytes(bytes).file_name(filename.into()),
        );
        if let Some(subfolder) = subfolder {
            form = form.text("subfolder", subfolder);
        }
        if let Some(overwrite) = overwrite {
            form = form.text("overwrite", overwrite.to_string());
        }
        self.send_json(self.post("/upload/image").multipart(form)).await
    }

    /// `POST /upload/mask` multipart, referencing the original image.
    pub async fn upload_mask(
        &self,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        original_ref: &Value,
    ) -> Result<UploadResult, ClientError> {
        let form = reqwest::multipart::Form::new()
            .part("image", reqwest::multipart::Part::bytes(bytes).file_name(filename.into()))
            .text("original_ref", original_ref.to_string());
        self.send_json(self.post("/upload/mask").multipart(form)).await
    }

    /// Pure URL construction against `host` for `GET /view`; never
    /// performs an HTTP request.
    pub fn get_path_image(&self, info: &Value) -> String {
        let filename = info.get("filename").and_then(Value::as_str).unwrap_or_default();
        let subfolder = info.get("subfolder").and_then(Value::as_str).unwrap_or_default();
        let kind = info.get("type").and_then(Value::as_str).unwrap_or("output");
        format!(
            "{}?filename={}&type={}&subfolder={}",
            self.url("/view"),
            urlencode(filename),
            urlencode(kind),
            urlencode(subfolder),
        )
    }

    /// Fetch the artifact bytes referenced by `info`, applying credentials
    /// when the backend requires them.
    pub async fn get_image(&self, info: &Value) -> Result<Vec<u8>, ClientError> {
        let url = self.get_path_image(info);
        let response = self
            .credentials
            .apply(self.http.get(url))
            .send()
            .await
            .map_err(|e| ClientError::Request {
                client_id: self.client_id.clone(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                client_id: self.client_id.clone(),
                status: status.as_u16(),
                body,
            });
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ClientError::Request {
                client_id: self.client_id.clone(),
                source: e,
            })
    }

    /// `POST /interrupt`: best-effort cancel of the currently executing prompt.
    pub async fn interrupt(&self) -> Result<(), ClientError> {
        self.post("/interrupt")
            .send()
            .await
            .map_err(|e| ClientError::Request {
                client_id: self.client_id.clone(),
                source: e,
            })?;
        Ok(())
    }

    /// `POST /free`.
    pub async fn free_memory(&self, unload_models: bool, free_memory: bool) -> Result<bool, ClientError> {
        #[derive(Serialize)]
        struct Body {
            unload_models: bool,
            free_memory: bool,
        }
        let response = self
            .post("/free")
            .json(&Body { unload_models, free_memory })
            .send()
            .await
            .map_err(|e| ClientError::Request {
                client_id: self.client_id.clone(),
                source: e,
            })?;
        Ok(response.status().is_success())
    }

    /// `GET /internal/logs/raw`.
    pub async fn get_logs_raw(&self) -> Result<Value, ClientError> {
        self.send_json(self.get("/internal/logs/raw")).await
    }

    /// `GET /extensions`: names (or paths) of server-side extensions the
    /// backend has loaded.
    pub async fn get_extensions(&self) -> Result<Vec<String>, ClientError> {
        self.send_json(self.get("/extensions")).await
    }

    /// `PATCH /internal/logs/subscribe`.
    pub async fn set_logs_subscription(&self, enabled: bool) -> Result<(), ClientError> {
        #[derive(Serialize)]
        struct Body {
            enabled: bool,
            #[serde(rename = "clientId")]
            client_id: String,
        }
        self.credentials
            .apply(self.http.patch(self.url("/internal/logs/subscribe")))
            .json(&Body {
                enabled,
                client_id: self.client_id.0.clone(),
            })
            .send()
            .await
            .map_err(|e| ClientError::Request {
                client_id: self.client_id.clone(),
                source: e,
            })?;
        Ok(())
    }
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_path_image_is_pure_url_construction() {
        let api = HttpApi::new(ClientId::from("c1"), "http://localhost:8188", Credentials::None);
        let info = serde_json::json!({"filename": "out 1.png", "subfolder": "", "type": "output"});
        let url = api.get_path_image(&info);
        assert_eq!(
            url,
            "http://localhost:8188/view?filename=out%201.png&type=output&subfolder="
        );
    }

    #[test]
    fn host_trailing_slash_is_not_duplicated() {
        let api = HttpApi::new(ClientId::from("c1"), "http://localhost:8188/", Credentials::None);
        assert_eq!(api.url("/prompt"), "http://localhost:8188/prompt");
    }
}
