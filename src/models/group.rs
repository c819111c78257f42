use serde::{Deserialize, Serialize};

use super::device::DeviceState;

/// Group summary as listed by the public groups feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiGroup {
    pub group_id: String,
    #[serde(default)]
    pub member_count: u32,
    pub name: String,
    pub visibility: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub session_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_state: Option<DeviceState>,
    #[serde(default)]
    pub away: bool,
}

/// Full group state pushed on join and on every group update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayGroup {
    pub group_id: String,
    pub name: String,
    pub visibility: String,
    pub state: String,
    #[serde(default)]
    pub owner_session_id: Option<String>,
    #[serde(default)]
    pub members: Vec<GroupMember>,
    #[serde(default)]
    pub sesh_counter: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayGroupCreate {
    pub group_id: String,
    pub name: String,
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayGroupDelete {
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUserJoin {
    pub group_id: String,
    pub session_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_state: Option<DeviceState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUserLeft {
    pub group_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUserUpdate {
    pub group_id: String,
    pub session_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUserDeviceUpdate {
    pub group_id: String,
    pub session_id: String,
    pub device_state: DeviceState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUserDeviceDisconnect {
    pub group_id: String,
    pub session_id: String,
}

/// Who triggered a group action (ready, unready, heat inquiry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupActionInitiator {
    pub group_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupVisibilityChange {
    pub group_id: String,
    pub session_id: String,
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReaction {
    pub group_id: String,
    pub author_session_id: String,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub group_id: String,
    pub author_session_id: String,
    pub content: String,
}

/// Error reported by the gateway for a rejected action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayErrorPayload {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResumed {
    pub session_id: String,
}
