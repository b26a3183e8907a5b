//! World and instance tracking that spans hands and files.

use crate::action::Seat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Access type of an instance, as encoded in the `~type(owner)` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    #[default]
    Public,
    FriendsPlus,
    Friends,
    InvitePlus,
    Invite,
    Group,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Full instance tag, e.g. `12345~private(usr_abc)~region(jp)`.
    pub id: String,
    pub kind: InstanceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl InstanceInfo {
    /// Parses an instance tag. Unknown `~` segments are ignored.
    pub fn parse(tag: &str) -> Self {
        let mut info = InstanceInfo {
            id: tag.to_string(),
            ..InstanceInfo::default()
        };
        let mut can_request_invite = false;
        for segment in tag.split('~').skip(1) {
            let (name, arg) = match segment.split_once('(') {
                Some((name, rest)) => (name, rest.strip_suffix(')').map(str::to_string)),
                None => (segment, None),
            };
            match name {
                "private" => {
                    info.kind = InstanceKind::Invite;
                    info.owner = arg;
                }
                "friends" => {
                    info.kind = InstanceKind::Friends;
                    info.owner = arg;
                }
                "hidden" => {
                    info.kind = InstanceKind::FriendsPlus;
                    info.owner = arg;
                }
                "group" => {
                    info.kind = InstanceKind::Group;
                    info.owner = arg;
                }
                "canRequestInvite" => can_request_invite = true,
                "region" => info.region = arg,
                _ => {}
            }
        }
        if can_request_invite && info.kind == InstanceKind::Invite {
            info.kind = InstanceKind::InvitePlus;
        }
        info
    }
}

/// Session state carried across hands, files, and restarts.
///
/// The encoding produced by [`WorldContext::to_snapshot`] is stable: users
/// live in an ordered map, so restoring a snapshot and encoding it again yields
/// the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldContext {
    #[serde(default)]
    pub world_id: Option<String>,
    #[serde(default)]
    pub world_name: Option<String>,
    #[serde(default)]
    pub instance: Option<InstanceInfo>,
    /// Assumed true until a world transition says otherwise.
    pub in_poker_world: bool,
    /// User id (or display name when no id was logged) to display name.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    #[serde(default)]
    pub local_seat: Option<Seat>,
}

impl Default for WorldContext {
    fn default() -> Self {
        WorldContext {
            world_id: None,
            world_name: None,
            instance: None,
            in_poker_world: true,
            users: BTreeMap::new(),
            local_seat: None,
        }
    }
}

impl WorldContext {
    /// Enter a world instance. `targets` lists the poker world ids; when empty
    /// every world counts.
    pub fn join(&mut self, world_id: &str, instance: InstanceInfo, targets: &[String]) {
        self.world_id = Some(world_id.to_string());
        self.world_name = None;
        self.instance = Some(instance);
        self.in_poker_world = targets.is_empty() || targets.iter().any(|t| t == world_id);
        self.users.clear();
        self.local_seat = None;
    }

    pub fn set_world_name(&mut self, name: &str) {
        self.world_name = Some(name.to_string());
    }

    pub fn user_joined(&mut self, name: &str, user_id: Option<&str>) {
        let key = user_id.unwrap_or(name);
        self.users.insert(key.to_string(), name.to_string());
    }

    pub fn user_left(&mut self, name: &str, user_id: Option<&str>) {
        let key = user_id.unwrap_or(name);
        self.users.remove(key);
    }

    /// Leave the current instance. Hands are ignored until the next join.
    pub fn leave(&mut self) {
        self.instance = None;
        self.in_poker_world = false;
        self.users.clear();
        self.local_seat = None;
    }

    pub fn to_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_snapshot(snapshot: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_private_instance() {
        let info = InstanceInfo::parse("12345~private(usr_abc)~canRequestInvite~region(jp)");
        assert_eq!(info.kind, InstanceKind::InvitePlus);
        assert_eq!(info.owner.as_deref(), Some("usr_abc"));
        assert_eq!(info.region.as_deref(), Some("jp"));
    }

    #[test]
    fn parses_public_instance() {
        let info = InstanceInfo::parse("67890");
        assert_eq!(info.kind, InstanceKind::Public);
        assert_eq!(info.owner, None);
        assert_eq!(info.region, None);
    }

    #[test]
    fn snapshot_is_byte_stable() {
        let mut ctx = WorldContext::default();
        ctx.join("wrld_poker", InstanceInfo::parse("1~hidden(usr_x)~region(us)"), &[]);
        ctx.set_world_name("Poker Lounge");
        ctx.user_joined("Zed", Some("usr_z"));
        ctx.user_joined("Amy", Some("usr_a"));
        ctx.local_seat = Some(3);

        let first = ctx.to_snapshot().unwrap();
        let restored = WorldContext::from_snapshot(&first).unwrap();
        assert_eq!(restored, ctx);
        assert_eq!(restored.to_snapshot().unwrap(), first);
    }

    #[test]
    fn join_respects_targets() {
        let mut ctx = WorldContext::default();
        let targets = vec!["wrld_poker".to_string()];
        ctx.join("wrld_other", InstanceInfo::parse("1"), &targets);
        assert!(!ctx.in_poker_world);
        ctx.join("wrld_poker", InstanceInfo::parse("2"), &targets);
        assert!(ctx.in_poker_world);
        ctx.leave();
        assert!(!ctx.in_poker_world);
    }
}
