use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::group::{
    ApiGroup, GatewayErrorPayload, GatewayGroup, GatewayGroupCreate, GatewayGroupDelete,
    GroupActionInitiator, GroupMessage, GroupReaction, GroupUserDeviceDisconnect,
    GroupUserDeviceUpdate, GroupUserJoin, GroupUserLeft, GroupUserUpdate, GroupVisibilityChange,
    SessionResumed,
};

/// Opcodes for gateway messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Hello,
    Join,
    CreateGroup,
    Event,
    SendDeviceState,
    UpdateGroup,
    UpdateUser,
    LeaveGroup,
    InquireHeating,
    StartWithReady,
    DisconnectDevice,
    SendMessage,
    StopAwaiting,
    ResumeSession,
    SendReaction,
    DeleteGroup,
    Heartbeat,
}

impl Op {
    pub fn code(self) -> u16 {
        match self {
            Op::Hello => 0,
            Op::Join => 1,
            Op::CreateGroup => 2,
            Op::Event => 3,
            Op::SendDeviceState => 4,
            Op::UpdateGroup => 5,
            Op::UpdateUser => 6,
            Op::LeaveGroup => 7,
            Op::InquireHeating => 8,
            Op::StartWithReady => 9,
            Op::DisconnectDevice => 10,
            Op::SendMessage => 11,
            Op::StopAwaiting => 12,
            Op::ResumeSession => 13,
            Op::SendReaction => 14,
            Op::DeleteGroup => 15,
            Op::Heartbeat => 420,
        }
    }

    pub fn from_code(code: u16) -> Option<Op> {
        let op = match code {
            0 => Op::Hello,
            1 => Op::Join,
            2 => Op::CreateGroup,
            3 => Op::Event,
            4 => Op::SendDeviceState,
            5 => Op::UpdateGroup,
            6 => Op::UpdateUser,
            7 => Op::LeaveGroup,
            8 => Op::InquireHeating,
            9 => Op::StartWithReady,
            10 => Op::DisconnectDevice,
            11 => Op::SendMessage,
            12 => Op::StopAwaiting,
            13 => Op::ResumeSession,
            14 => Op::SendReaction,
            15 => Op::DeleteGroup,
            420 => Op::Heartbeat,
            _ => return None,
        };
        Some(op)
    }
}

/// Event tags carried in `t` when `op` is `Event`.
pub mod event_tag {
    pub const JOINED_GROUP: &str = "JOINED_GROUP";
    pub const GROUP_CREATE: &str = "GROUP_CREATE";
    pub const GROUP_DELETE: &str = "GROUP_DELETE";
    pub const GROUP_UPDATE: &str = "GROUP_UPDATE";
    pub const GROUP_USER_JOIN: &str = "GROUP_USER_JOIN";
    pub const GROUP_USER_LEFT: &str = "GROUP_USER_LEFT";
    pub const GROUP_USER_UPDATE: &str = "GROUP_USER_UPDATE";
    pub const GROUP_USER_DEVICE_UPDATE: &str = "GROUP_USER_DEVICE_UPDATE";
    pub const GROUP_USER_DEVICE_DISCONNECT: &str = "GROUP_USER_DEVICE_DISCONNECT";
    pub const GROUP_JOIN_ERROR: &str = "GROUP_JOIN_ERROR";
    pub const GROUP_HEAT_BEGIN: &str = "GROUP_START_HEATING";
    pub const GROUP_HEAT_INQUIRY: &str = "GROUP_HEAT_INQUIRY";
    pub const GROUP_USER_READY: &str = "GROUP_USER_READY";
    pub const GROUP_USER_UNREADY: &str = "GROUP_USER_UNREADY";
    pub const GROUP_ACTION_ERROR: &str = "GROUP_ACTION_ERROR";
    pub const GROUP_VISIBILITY_CHANGE: &str = "GROUP_VISIBILITY_CHANGE";
    pub const PUBLIC_GROUPS_UPDATE: &str = "PUBLIC_GROUPS_UPDATE";
    pub const GROUP_CREATE_ERROR: &str = "GROUP_CREATE_ERROR";
    pub const USER_UPDATE_ERROR: &str = "USER_UPDATE_ERROR";
    pub const GROUP_REACTION: &str = "GROUP_REACTION";
    pub const GROUP_MESSAGE: &str = "GROUP_MESSAGE";
    pub const SESSION_RESUMED: &str = "SESSION_RESUMED";
}

/// Gateway message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: u16,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_tag: Option<String>,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    pub fn new(op: Op, payload: Option<serde_json::Value>) -> Self {
        Self {
            op: op.code(),
            event_tag: None,
            payload,
        }
    }
}

/// HELLO payload data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloData {
    pub heartbeat_interval: u64,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

/// RESUME_SESSION payload data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSessionData {
    pub session_id: String,
    pub session_token: String,
}

/// Closed set of names listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connected,
    Init,
    JoinedGroup,
    GroupCreate,
    GroupUpdate,
    GroupDelete,
    GroupUserJoin,
    GroupUserLeft,
    GroupUserUpdate,
    GroupUserDeviceUpdate,
    GroupUserDeviceDisconnect,
    GroupHeatInquiry,
    GroupHeatBegin,
    GroupUserReady,
    GroupUserUnready,
    GroupReaction,
    GroupMessage,
    GroupVisibilityChange,
    PublicGroupsUpdate,
    SessionResumed,
    GroupJoinError,
    GroupActionError,
    GroupCreateError,
    UserUpdateError,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Connected => "connected",
            EventName::Init => "init",
            EventName::JoinedGroup => "joined_group",
            EventName::GroupCreate => "group_create",
            EventName::GroupUpdate => "group_update",
            EventName::GroupDelete => "group_delete",
            EventName::GroupUserJoin => "group_user_join",
            EventName::GroupUserLeft => "group_user_left",
            EventName::GroupUserUpdate => "group_user_update",
            EventName::GroupUserDeviceUpdate => "group_user_device_update",
            EventName::GroupUserDeviceDisconnect => "group_user_device_disconnect",
            EventName::GroupHeatInquiry => "group_heat_inquiry",
            EventName::GroupHeatBegin => "group_heat_begin",
            EventName::GroupUserReady => "group_user_ready",
            EventName::GroupUserUnready => "group_user_unready",
            EventName::GroupReaction => "group_reaction",
            EventName::GroupMessage => "group_message",
            EventName::GroupVisibilityChange => "group_visibility_change",
            EventName::PublicGroupsUpdate => "public_groups_update",
            EventName::SessionResumed => "session_resumed",
            EventName::GroupJoinError => "group_join_error",
            EventName::GroupActionError => "group_action_error",
            EventName::GroupCreateError => "group_create_error",
            EventName::UserUpdateError => "user_update_error",
        }
    }

    /// Map an event tag to the listener set it is dispatched to.
    pub fn for_tag(tag: &str) -> Option<EventName> {
        let name = match tag {
            event_tag::JOINED_GROUP => EventName::JoinedGroup,
            event_tag::GROUP_CREATE => EventName::GroupCreate,
            event_tag::GROUP_DELETE => EventName::GroupDelete,
            event_tag::GROUP_UPDATE => EventName::GroupUpdate,
            event_tag::GROUP_USER_JOIN => EventName::GroupUserJoin,
            event_tag::GROUP_USER_LEFT => EventName::GroupUserLeft,
            event_tag::GROUP_USER_UPDATE => EventName::GroupUserUpdate,
            event_tag::GROUP_USER_DEVICE_UPDATE => EventName::GroupUserDeviceUpdate,
            event_tag::GROUP_USER_DEVICE_DISCONNECT => EventName::GroupUserDeviceDisconnect,
            event_tag::GROUP_JOIN_ERROR => EventName::GroupJoinError,
            event_tag::GROUP_HEAT_BEGIN => EventName::GroupHeatBegin,
            event_tag::GROUP_HEAT_INQUIRY => EventName::GroupHeatInquiry,
            event_tag::GROUP_USER_READY => EventName::GroupUserReady,
            event_tag::GROUP_USER_UNREADY => EventName::GroupUserUnready,
            event_tag::GROUP_ACTION_ERROR => EventName::GroupActionError,
            event_tag::GROUP_VISIBILITY_CHANGE => EventName::GroupVisibilityChange,
            event_tag::PUBLIC_GROUPS_UPDATE => EventName::PublicGroupsUpdate,
            event_tag::GROUP_CREATE_ERROR => EventName::GroupCreateError,
            event_tag::USER_UPDATE_ERROR => EventName::UserUpdateError,
            event_tag::GROUP_REACTION => EventName::GroupReaction,
            event_tag::GROUP_MESSAGE => EventName::GroupMessage,
            event_tag::SESSION_RESUMED => EventName::SessionResumed,
            _ => return None,
        };
        Some(name)
    }
}

/// A decoded event, one variant per listener name.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Connected,
    Init,
    JoinedGroup(GatewayGroup),
    GroupCreate(GatewayGroupCreate),
    GroupUpdate(GatewayGroup),
    GroupDelete(GatewayGroupDelete),
    GroupUserJoin(GroupUserJoin),
    GroupUserLeft(GroupUserLeft),
    GroupUserUpdate(GroupUserUpdate),
    GroupUserDeviceUpdate(GroupUserDeviceUpdate),
    GroupUserDeviceDisconnect(GroupUserDeviceDisconnect),
    GroupHeatInquiry(GroupActionInitiator),
    GroupHeatBegin,
    GroupUserReady(GroupActionInitiator),
    GroupUserUnready(GroupActionInitiator),
    GroupReaction(GroupReaction),
    GroupMessage(GroupMessage),
    GroupVisibilityChange(GroupVisibilityChange),
    PublicGroupsUpdate(Vec<ApiGroup>),
    SessionResumed(SessionResumed),
    GroupJoinError(GatewayErrorPayload),
    GroupActionError(GatewayErrorPayload),
    GroupCreateError(GatewayErrorPayload),
    UserUpdateError(GatewayErrorPayload),
}

impl GatewayEvent {
    pub fn name(&self) -> EventName {
        match self {
            GatewayEvent::Connected => EventName::Connected,
            GatewayEvent::Init => EventName::Init,
            GatewayEvent::JoinedGroup(_) => EventName::JoinedGroup,
            GatewayEvent::GroupCreate(_) => EventName::GroupCreate,
            GatewayEvent::GroupUpdate(_) => EventName::GroupUpdate,
            GatewayEvent::GroupDelete(_) => EventName::GroupDelete,
            GatewayEvent::GroupUserJoin(_) => EventName::GroupUserJoin,
            GatewayEvent::GroupUserLeft(_) => EventName::GroupUserLeft,
            GatewayEvent::GroupUserUpdate(_) => EventName::GroupUserUpdate,
            GatewayEvent::GroupUserDeviceUpdate(_) => EventName::GroupUserDeviceUpdate,
            GatewayEvent::GroupUserDeviceDisconnect(_) => EventName::GroupUserDeviceDisconnect,
            GatewayEvent::GroupHeatInquiry(_) => EventName::GroupHeatInquiry,
            GatewayEvent::GroupHeatBegin => EventName::GroupHeatBegin,
            GatewayEvent::GroupUserReady(_) => EventName::GroupUserReady,
            GatewayEvent::GroupUserUnready(_) => EventName::GroupUserUnready,
            GatewayEvent::GroupReaction(_) => EventName::GroupReaction,
            GatewayEvent::GroupMessage(_) => EventName::GroupMessage,
            GatewayEvent::GroupVisibilityChange(_) => EventName::GroupVisibilityChange,
            GatewayEvent::PublicGroupsUpdate(_) => EventName::PublicGroupsUpdate,
            GatewayEvent::SessionResumed(_) => EventName::SessionResumed,
            GatewayEvent::GroupJoinError(_) => EventName::GroupJoinError,
            GatewayEvent::GroupActionError(_) => EventName::GroupActionError,
            GatewayEvent::GroupCreateError(_) => EventName::GroupCreateError,
            GatewayEvent::UserUpdateError(_) => EventName::UserUpdateError,
        }
    }

    /// Decode the payload of an `Event` envelope. Unmapped tags yield `None`.
    pub fn decode(
        tag: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<Option<GatewayEvent>, serde_json::Error> {
        let Some(name) = EventName::for_tag(tag) else {
            return Ok(None);
        };
        let payload = payload.unwrap_or(serde_json::Value::Null);

        let event = match name {
            EventName::JoinedGroup => GatewayEvent::JoinedGroup(parse(payload)?),
            EventName::GroupCreate => GatewayEvent::GroupCreate(parse(payload)?),
            EventName::GroupUpdate => GatewayEvent::GroupUpdate(parse(payload)?),
            EventName::GroupDelete => GatewayEvent::GroupDelete(parse(payload)?),
            EventName::GroupUserJoin => GatewayEvent::GroupUserJoin(parse(payload)?),
            EventName::GroupUserLeft => GatewayEvent::GroupUserLeft(parse(payload)?),
            EventName::GroupUserUpdate => GatewayEvent::GroupUserUpdate(parse(payload)?),
            EventName::GroupUserDeviceUpdate => {
                GatewayEvent::GroupUserDeviceUpdate(parse(payload)?)
            }
            EventName::GroupUserDeviceDisconnect => {
                GatewayEvent::GroupUserDeviceDisconnect(parse(payload)?)
            }
            EventName::GroupHeatInquiry => GatewayEvent::GroupHeatInquiry(parse(payload)?),
            EventName::GroupHeatBegin => GatewayEvent::GroupHeatBegin,
            EventName::GroupUserReady => GatewayEvent::GroupUserReady(parse(payload)?),
            EventName::GroupUserUnready => GatewayEvent::GroupUserUnready(parse(payload)?),
            EventName::GroupReaction => GatewayEvent::GroupReaction(parse(payload)?),
            EventName::GroupMessage => GatewayEvent::GroupMessage(parse(payload)?),
            EventName::GroupVisibilityChange => {
                GatewayEvent::GroupVisibilityChange(parse(payload)?)
            }
            EventName::PublicGroupsUpdate => GatewayEvent::PublicGroupsUpdate(parse(payload)?),
            EventName::SessionResumed => GatewayEvent::SessionResumed(parse(payload)?),
            EventName::GroupJoinError => GatewayEvent::GroupJoinError(parse(payload)?),
            EventName::GroupActionError => GatewayEvent::GroupActionError(parse(payload)?),
            EventName::GroupCreateError => GatewayEvent::GroupCreateError(parse(payload)?),
            EventName::UserUpdateError => GatewayEvent::UserUpdateError(parse(payload)?),
            // Lifecycle names never arrive over the wire.
            EventName::Connected | EventName::Init => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn parse<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(payload)
}

/// An inbound envelope resolved by `(op, t)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Hello(HelloData),
    Event(GatewayEvent),
    Ignored,
}

impl Inbound {
    pub fn decode(envelope: Envelope) -> Result<Inbound, serde_json::Error> {
        match Op::from_code(envelope.op) {
            Some(Op::Hello) => {
                let payload = envelope.payload.unwrap_or(serde_json::Value::Null);
                Ok(Inbound::Hello(serde_json::from_value(payload)?))
            }
            Some(Op::Event) => {
                let Some(tag) = envelope.event_tag else {
                    return Ok(Inbound::Ignored);
                };
                Ok(GatewayEvent::decode(&tag, envelope.payload)?
                    .map(Inbound::Event)
                    .unwrap_or(Inbound::Ignored))
            }
            _ => Ok(Inbound::Ignored),
        }
    }
}
