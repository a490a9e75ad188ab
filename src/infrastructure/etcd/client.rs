// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Administrative access to the managed etcd cluster through its v3 JSON gateway.

use crate::shared::error::{OperatorError, Result};
use base64::Engine;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw snapshot bytes, chunk by chunk.
pub type SnapshotStream = BoxStream<'static, Result<Vec<u8>>>;

/// A member as reported by etcd. `name` is empty until the member has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: u64,
    pub name: String,
    pub peer_urls: Vec<String>,
    pub client_urls: Vec<String>,
}

/// Façade over etcd's membership and maintenance APIs.
///
/// Every call takes the client endpoints to try, in order.
#[async_trait::async_trait]
pub trait EtcdAdmin: Send + Sync {
    async fn list_members(&self, endpoints: &[String]) -> Result<Vec<MemberInfo>>;

    /// Registers a member by peer URL, returning its assigned id.
    async fn add_member(&self, endpoints: &[String], peer_url: &str) -> Result<u64>;

    async fn remove_member(&self, endpoints: &[String], id: u64) -> Result<()>;

    async fn snapshot(&self, endpoints: &[String], timeout: Duration) -> Result<SnapshotStream>;
}

pub struct EtcdGatewayClient {
    http: reqwest::Client,
    call_timeout: Duration,
}

impl EtcdGatewayClient {
    pub fn new(call_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(call_timeout)
            .build()?;
        Ok(Self { http, call_timeout })
    }

    async fn post<B, R>(&self, endpoints: &[String], path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let mut last_error = None;
        for endpoint in endpoints {
            let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
            match self.post_once(&url, body).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, path, error = %e, "etcd endpoint failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            OperatorError::EtcdError(format!("no endpoints available for {}", path))
        }))
    }

    async fn post_once<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(url)
            .timeout(self.call_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| map_http_error(url, e))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| map_http_error(url, e))?;
        if !status.is_success() {
            let message = serde_json::from_slice::<GatewayError>(&bytes)
                .map(|e| e.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(OperatorError::EtcdError(format!(
                "{} returned {}: {}",
                url, status, message
            )));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn map_http_error(url: &str, err: reqwest::Error) -> OperatorError {
    if err.is_timeout() {
        OperatorError::Timeout(format!("request to {} timed out", url))
    } else {
        OperatorError::Http(err)
    }
}

#[async_trait::async_trait]
impl EtcdAdmin for EtcdGatewayClient {
    async fn list_members(&self, endpoints: &[String]) -> Result<Vec<MemberInfo>> {
        let resp: MemberListResponse = self
            .post(endpoints, "/v3/cluster/member/list", &serde_json::json!({}))
            .await?;
        resp.members.into_iter().map(MemberInfo::try_from).collect()
    }

    async fn add_member(&self, endpoints: &[String], peer_url: &str) -> Result<u64> {
        let resp: MemberAddResponse = self
            .post(
                endpoints,
                "/v3/cluster/member/add",
                &serde_json::json!({ "peerURLs": [peer_url] }),
            )
            .await?;
        let member = resp.member.ok_or_else(|| {
            OperatorError::EtcdError(format!("member add for {} returned no member", peer_url))
        })?;
        Ok(MemberInfo::try_from(member)?.id)
    }

    async fn remove_member(&self, endpoints: &[String], id: u64) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                endpoints,
                "/v3/cluster/member/remove",
                &serde_json::json!({ "ID": id.to_string() }),
            )
            .await?;
        Ok(())
    }

    async fn snapshot(&self, endpoints: &[String], timeout: Duration) -> Result<SnapshotStream> {
        let mut last_error = None;
        for endpoint in endpoints {
            let url = format!("{}/v3/maintenance/snapshot", endpoint.trim_end_matches('/'));
            let sent = self
                .http
                .post(&url)
                .timeout(timeout)
                .json(&serde_json::json!({}))
                .send()
                .await;

            match sent {
                Ok(response) if response.status().is_success() => {
                    let url_for_errors = url.clone();
                    let body = response
                        .bytes_stream()
                        .map_ok(|chunk| chunk.to_vec())
                        .map_err(move |e| map_http_error(&url_for_errors, e))
                        .boxed();
                    return Ok(decode_snapshot_stream(body));
                }
                Ok(response) => {
                    last_error = Some(OperatorError::EtcdError(format!(
                        "{} returned {}",
                        url,
                        response.status()
                    )));
                }
                Err(e) => last_error = Some(map_http_error(&url, e)),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            OperatorError::EtcdError("no endpoints available for snapshot".to_string())
        }))
    }
}

/// Turns the gateway's newline delimited JSON frames into raw snapshot bytes.
pub fn decode_snapshot_stream(body: SnapshotStream) -> SnapshotStream {
    stream::try_unfold((body.fuse().boxed(), Vec::new()), |(body, buf)| {
        next_blob(body, buf)
    })
    .boxed()
}

async fn next_blob(
    mut body: SnapshotStream,
    mut buf: Vec<u8>,
) -> Result<Option<(Vec<u8>, (SnapshotStream, Vec<u8>))>> {
    loop {
        if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            if let Some(blob) = decode_snapshot_frame(&line)? {
                return Ok(Some((blob, (body, buf))));
            }
            continue;
        }

        match body.next().await {
            Some(chunk) => buf.extend_from_slice(&chunk?),
            None => {
                let line = std::mem::take(&mut buf);
                return Ok(decode_snapshot_frame(&line)?.map(|blob| (blob, (body, buf))));
            }
        }
    }
}

fn decode_snapshot_frame(line: &[u8]) -> Result<Option<Vec<u8>>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let frame: SnapshotFrame = serde_json::from_str(text)?;
    if let Some(error) = frame.error {
        return Err(OperatorError::EtcdError(format!(
            "snapshot stream aborted: {}",
            error.message
        )));
    }

    match frame.result.and_then(|r| r.blob) {
        Some(blob) => Ok(Some(
            base64::engine::general_purpose::STANDARD.decode(blob.as_bytes())?,
        )),
        None => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "peerURLs", default)]
    peer_urls: Vec<String>,
    #[serde(rename = "clientURLs", default)]
    client_urls: Vec<String>,
}

impl TryFrom<WireMember> for MemberInfo {
    type Error = OperatorError;

    fn try_from(wire: WireMember) -> Result<Self> {
        let id = wire.id.parse::<u64>().map_err(|e| {
            OperatorError::EtcdError(format!("invalid member id '{}': {}", wire.id, e))
        })?;
        Ok(MemberInfo {
            id,
            name: wire.name,
            peer_urls: wire.peer_urls,
            client_urls: wire.client_urls,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MemberListResponse {
    #[serde(default)]
    members: Vec<WireMember>,
}

#[derive(Debug, Deserialize)]
struct MemberAddResponse {
    member: Option<WireMember>,
}

#[derive(Debug, Deserialize)]
struct SnapshotFrame {
    result: Option<SnapshotChunk>,
    error: Option<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct SnapshotChunk {
    blob: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> String {
        format!(
            "{{\"result\":{{\"remaining_bytes\":\"0\",\"blob\":\"{}\"}}}}\n",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    fn chunked(body: String, chunk_size: usize) -> SnapshotStream {
        let chunks: Vec<Result<Vec<u8>>> = body
            .into_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(c.to_vec()))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn test_decode_frames_split_across_chunks() {
        let body = format!("{}{}", frame(b"hello "), frame(b"world"));
        let decoded: Vec<Vec<u8>> = decode_snapshot_stream(chunked(body, 7))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(decoded.concat(), b"hello world".to_vec());
    }

    #[tokio::test]
    async fn test_decode_last_frame_without_newline() {
        let body = frame(b"tail").trim_end().to_string();
        let decoded: Vec<Vec<u8>> = decode_snapshot_stream(chunked(body, 5))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(decoded.concat(), b"tail".to_vec());
    }

    #[tokio::test]
    async fn test_decode_error_frame_fails_stream() {
        let body = format!(
            "{}{{\"error\":{{\"grpc_code\":14,\"message\":\"leader lost\"}}}}\n",
            frame(b"partial")
        );
        let result: Result<Vec<Vec<u8>>> =
            decode_snapshot_stream(chunked(body, 64)).try_collect().await;
        match result {
            Err(OperatorError::EtcdError(msg)) => assert!(msg.contains("leader lost")),
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_wire_member_ids_are_strings() {
        let resp: MemberListResponse = serde_json::from_str(
            r#"{"header":{},"members":[{"ID":"10501334649042878790","name":"c-0000","peerURLs":["http://c-0000:2380"]},{"ID":"42","peerURLs":["http://c-0001:2380"]}]}"#,
        )
        .unwrap();
        let members: Vec<MemberInfo> = resp
            .members
            .into_iter()
            .map(MemberInfo::try_from)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(members[0].id, 10501334649042878790);
        assert_eq!(members[0].name, "c-0000");
        assert_eq!(members[1].name, "");
        assert!(members[1].client_urls.is_empty());
    }
}
