//! 可达性探测
//!
//! 只判断链路是否可达：向目标发送一个格式正确的请求，收到任何语法上
//! 合法的响应（包括否定或错误响应）都视为可达；超时、拒绝连接或响应
//! 格式错误视为不可达。

use crate::config::{NetworkCheckerSpec, ProbeProtocol};
use crate::error::CheckError;
use async_trait::async_trait;
use hickory_proto::error::ProtoError;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tracing::debug;
use uuid::Uuid;

/// UDP DNS 响应最大长度
const DNS_MAX_UDP_LEN: usize = 512;

/// 可达性探测接口
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    /// 探测目标地址，可达时返回 `Ok(())`
    async fn probe(&self, target: SocketAddr) -> Result<(), CheckError>;
}

/// 按协议构建探测器
pub fn prober_for(spec: &NetworkCheckerSpec) -> anyhow::Result<Arc<dyn ReachabilityProber>> {
    let prober: Arc<dyn ReachabilityProber> = match spec.protocol {
        ProbeProtocol::Dns => Arc::new(DnsProber::new(&spec.query_name, spec.probe_timeout())?),
        ProbeProtocol::Http => Arc::new(HttpProber::new(&spec.http_path, spec.probe_timeout())?),
    };
    Ok(prober)
}

/// 基于 UDP 的 DNS 探测器
#[derive(Debug, Clone)]
pub struct DnsProber {
    query_name: Name,
    timeout: Duration,
}

impl DnsProber {
    /// 创建 DNS 探测器，查询名称在创建时校验
    pub fn new(query_name: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            query_name: parse_query_name(query_name)?,
            timeout,
        })
    }

    async fn exchange(&self, target: SocketAddr) -> Result<(), CheckError> {
        let id = query_id();
        let query = encode_query(id, &self.query_name)
            .map_err(|e| CheckError::Probe(format!("编码查询失败: {e}")))?;

        let bind_addr = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| CheckError::Probe(format!("绑定 UDP 端口失败: {e}")))?;
        socket
            .connect(target)
            .await
            .map_err(|e| CheckError::Probe(format!("连接 {target} 失败: {e}")))?;
        socket
            .send(&query)
            .await
            .map_err(|e| CheckError::Probe(format!("发送查询到 {target} 失败: {e}")))?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; DNS_MAX_UDP_LEN];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let len = match timeout(remaining, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => return Err(CheckError::Probe(format!("接收 {target} 响应失败: {e}"))),
                Err(_) => return Err(CheckError::Timeout(self.timeout)),
            };

            match check_reply(&buf[..len], id) {
                ReplyCheck::Valid => return Ok(()),
                // 旧查询的迟到响应，继续等待
                ReplyCheck::IdMismatch => {
                    debug!("忽略来自 {} 的不匹配响应", target);
                    continue;
                }
                ReplyCheck::Malformed(reason) => {
                    return Err(CheckError::Probe(format!("{target} 响应格式错误: {reason}")))
                }
            }
        }
    }
}

#[async_trait]
impl ReachabilityProber for DnsProber {
    async fn probe(&self, target: SocketAddr) -> Result<(), CheckError> {
        self.exchange(target).await
    }
}

fn query_id() -> u16 {
    (Uuid::new_v4().as_u128() & 0xffff) as u16
}

/// 解析并校验查询名称
fn parse_query_name(name: &str) -> anyhow::Result<Name> {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() || trimmed.split('.').any(str::is_empty) {
        anyhow::bail!("无效的查询名称: {}", name);
    }
    Name::from_ascii(trimmed).map_err(|e| anyhow::anyhow!("无效的查询名称 {}: {}", name, e))
}

/// 构造单个问题（A 记录，IN 类）的递归查询报文
pub(crate) fn encode_query(id: u16, name: &Name) -> Result<Vec<u8>, ProtoError> {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name.clone(), RecordType::A));
    message.to_vec()
}

#[derive(Debug, PartialEq, Eq)]
enum ReplyCheck {
    Valid,
    IdMismatch,
    Malformed(String),
}

/// 校验响应报文，整个报文必须能完整解析，不关心 RCODE
fn check_reply(reply: &[u8], id: u16) -> ReplyCheck {
    let message = match Message::from_vec(reply) {
        Ok(message) => message,
        Err(e) => return ReplyCheck::Malformed(e.to_string()),
    };
    if message.id() != id {
        return ReplyCheck::IdMismatch;
    }
    if message.message_type() != MessageType::Response {
        return ReplyCheck::Malformed("缺少响应标志".to_string());
    }
    ReplyCheck::Valid
}

/// 基于 HTTP 的探测器
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    path: String,
}

impl HttpProber {
    /// 创建 HTTP 探测器
    pub fn new(path: &str, timeout: Duration) -> anyhow::Result<Self> {
        // 3xx 本身就是响应，不跟随跳转
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Ok(Self { client, path })
    }

    /// 格式化请求错误信息
    fn format_request_error(error: &reqwest::Error) -> String {
        if error.is_timeout() {
            "Request timeout".to_string()
        } else if error.is_connect() {
            "Connection refused".to_string()
        } else if error.is_request() {
            "Invalid request".to_string()
        } else {
            format!("Request failed: {error}")
        }
    }
}

#[async_trait]
impl ReachabilityProber for HttpProber {
    async fn probe(&self, target: SocketAddr) -> Result<(), CheckError> {
        let url = format!("http://{}{}", target, self.path);
        match self.client.get(&url).send().await {
            // 任何 HTTP 响应都说明链路可达，状态码不参与判断
            Ok(response) => {
                debug!("{} 返回 HTTP {}", url, response.status().as_u16());
                Ok(())
            }
            Err(e) => Err(CheckError::Probe(format!(
                "{url}: {}",
                Self::format_request_error(&e)
            ))),
        }
    }
}
