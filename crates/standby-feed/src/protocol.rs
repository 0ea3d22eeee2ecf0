//! JSON 메시지 코덱.
//!
//! 송신 메시지(로그인, standby 모드 변경, 구독, Pong)를 인코딩하고
//! 수신 프레임을 봉투(envelope) 단위로 분류합니다. 시세 페이로드 자체는
//! 해석하지 않습니다.

use crate::error::FeedResult;
use serde::Serialize;
use serde_json::Value;
use standby_core::{Instruments, LoginConfig, Role, SubscriptionTemplate};

/// 로그인 스트림 ID.
pub const LOGIN_STREAM_ID: u64 = 1;

/// 채널별 첫 구독 요청 ID.
pub const FIRST_REQUEST_ID: u64 = 2;

const LOGIN_DOMAIN: &str = "Login";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoginRequest<'a> {
    #[serde(rename = "ID")]
    id: u64,
    domain: &'static str,
    key: LoginKey<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoginKey<'a> {
    name_type: &'static str,
    elements: LoginElements<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoginElements<'a> {
    application_id: &'a str,
    position: &'a str,
    authentication_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StandbyModeUpdate {
    #[serde(rename = "ID")]
    id: u64,
    #[serde(rename = "Type")]
    kind: &'static str,
    domain: &'static str,
    key: NameKey,
    complete: bool,
    map: StandbyMap,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NameKey {
    name: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StandbyMap {
    key_type: &'static str,
    entries: [StandbyEntry; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StandbyEntry {
    action: &'static str,
    key: &'static str,
    elements: StandbyElements,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StandbyElements {
    warm_standby_mode: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ItemRequest<'a> {
    #[serde(rename = "ID")]
    id: u64,
    key: ItemKey<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    view: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ItemKey<'a> {
    name: &'a Instruments,
    service: &'a str,
}

/// 송신 메시지 인코더.
///
/// 로그인 요청에 들어가는 클라이언트 식별 정보를 보관합니다.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    login: LoginConfig,
}

impl MessageCodec {
    /// 새 코덱 생성.
    pub fn new(login: LoginConfig) -> Self {
        Self { login }
    }

    /// 로그인 요청 인코딩.
    ///
    /// 토큰 갱신에 따른 재로그인이면 `"Refresh": false` 표식을 붙입니다.
    pub fn encode_login(&self, access_token: &str, is_refresh: bool) -> FeedResult<String> {
        let request = LoginRequest {
            id: LOGIN_STREAM_ID,
            domain: LOGIN_DOMAIN,
            key: LoginKey {
                name_type: "AuthnToken",
                elements: LoginElements {
                    application_id: &self.login.application_id,
                    position: &self.login.position,
                    authentication_token: access_token,
                },
            },
            refresh: is_refresh.then_some(false),
        };
        Ok(serde_json::to_string(&request)?)
    }

    /// standby 모드 변경 메시지 인코딩.
    pub fn encode_standby_mode(&self, role: Role) -> FeedResult<String> {
        let update = StandbyModeUpdate {
            id: LOGIN_STREAM_ID,
            kind: "Generic",
            domain: LOGIN_DOMAIN,
            key: NameKey {
                name: "ConsumerConnectionStatus",
            },
            complete: false,
            map: StandbyMap {
                key_type: "AsciiString",
                entries: [StandbyEntry {
                    action: "Add",
                    key: "WarmStandbyInfo",
                    elements: StandbyElements {
                        warm_standby_mode: role.warm_standby_mode(),
                    },
                }],
            },
        };
        Ok(serde_json::to_string(&update)?)
    }

    /// 구독 요청 인코딩.
    pub fn encode_subscription(&self, id: u64, template: &SubscriptionTemplate) -> FeedResult<String> {
        let request = ItemRequest {
            id,
            key: ItemKey {
                name: &template.instruments,
                service: &template.service,
            },
            view: template.fields.as_deref(),
        };
        Ok(serde_json::to_string(&request)?)
    }

    /// Pong 메시지 인코딩.
    pub fn encode_pong(&self) -> String {
        r#"{"Type":"Pong"}"#.to_string()
    }
}

/// 로그인 응답의 스트림 상태.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginState {
    /// `State.Stream` 값
    pub stream: Option<String>,
    /// `State.Data` 값
    pub data: Option<String>,
    /// `State.Text` 값 (거부 사유)
    pub text: Option<String>,
    /// 서버의 warm-standby 지원 여부
    pub supports_standby: bool,
}

impl LoginState {
    /// 로그인 성공 여부 (`Open` / `Ok`).
    pub fn is_healthy(&self) -> bool {
        self.stream.as_deref() == Some("Open") && self.data.as_deref() == Some("Ok")
    }
}

/// 분류된 수신 봉투.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Login 도메인 Refresh (로그인 응답)
    LoginRefresh(LoginState),
    /// Login 도메인 Status (스트림 상태 변경)
    LoginStatus(LoginState),
    /// 서버 keep-alive
    Ping,
    /// 그 외 모든 봉투
    Ignored,
}

/// 수신 프레임을 봉투 목록으로 분해합니다.
///
/// 배열이면 각 원소를, 단일 객체면 길이 1의 목록으로 처리합니다.
/// 알 수 없는 형태의 봉투는 `Ignored`로 분류되며, JSON이 아닌 프레임만
/// 에러를 반환합니다.
pub fn decode_frame(text: &str) -> FeedResult<Vec<InboundMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let messages = match value {
        Value::Array(items) => items.iter().map(classify).collect(),
        other => vec![classify(&other)],
    };
    Ok(messages)
}

fn classify(envelope: &Value) -> InboundMessage {
    let kind = envelope.get("Type").and_then(Value::as_str);
    let domain = envelope.get("Domain").and_then(Value::as_str);

    match (kind, domain) {
        (Some("Ping"), _) => InboundMessage::Ping,
        (Some("Refresh"), Some(LOGIN_DOMAIN)) => InboundMessage::LoginRefresh(login_state(envelope)),
        (Some("Status"), Some(LOGIN_DOMAIN)) => InboundMessage::LoginStatus(login_state(envelope)),
        _ => InboundMessage::Ignored,
    }
}

fn login_state(envelope: &Value) -> LoginState {
    let state = envelope.get("State");
    let field = |name: &str| {
        state
            .and_then(|s| s.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let supports_standby = envelope
        .pointer("/Key/Elements/SupportStandby")
        .map(|v| match v {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_u64() == Some(1),
            Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
            _ => false,
        })
        .unwrap_or(false);

    LoginState {
        stream: field("Stream"),
        data: field("Data"),
        text: field("Text"),
        supports_standby,
    }
}
