//! Connection registry: who is online, on which connections, in which
//! rooms
//!
//! Maps are sharded by key (DashMap); mutations are atomic at the key
//! level so concurrent handlers never contend on one global lock.

use dashmap::DashMap;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::user::UserProfile;
use crate::constants::PROFILE_CACHE_TTL_SECS;
use crate::core::connection::Connection;
use crate::core::message_types::ServerEvent;
use crate::error::{RelayError, Result};
use crate::storage::traits::UserDirectory;

/// Profile cached to avoid re-querying the directory on every event
struct CachedProfile {
    profile: UserProfile,
    cached_at: Instant,
}

/// A room member is one connection of one identity
type RoomMember = (String, String);

pub struct ConnectionRegistry {
    /// identity -> conn id -> live connection (multi-device)
    connections: DashMap<String, HashMap<String, Connection>>,
    /// room name -> joined (identity, conn id) pairs
    rooms: DashMap<String, HashSet<RoomMember>>,
    /// short-TTL read-through cache in front of the user directory
    profiles: DashMap<String, CachedProfile>,
    users: Arc<dyn UserDirectory>,
    profile_ttl: Duration,
}

impl ConnectionRegistry {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self::with_profile_ttl(users, Duration::from_secs(PROFILE_CACHE_TTL_SECS))
    }

    pub fn with_profile_ttl(users: Arc<dyn UserDirectory>, profile_ttl: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            profiles: DashMap::new(),
            users,
            profile_ttl,
        }
    }

    /// Register a connection for an identity. Registration is additive;
    /// the first handle flips presence online and broadcasts it.
    pub fn register(&self, identity: &str, conn: Connection) -> bool {
        let came_online = {
            let mut entry = self.connections.entry(identity.to_string()).or_default();
            let first = entry.is_empty();
            entry.insert(conn.id.clone(), conn);
            first
        };

        if came_online {
            self.broadcast_presence(identity, true);
        }
        came_online
    }

    /// Remove one connection. Presence flips offline only when the last
    /// handle goes, and the offline broadcast fires exactly once.
    pub fn unregister(&self, identity: &str, conn_id: &str) -> bool {
        let went_offline = {
            match self.connections.get_mut(identity) {
                Some(mut entry) => {
                    entry.remove(conn_id);
                    entry.is_empty()
                }
                None => false,
            }
        };

        if went_offline {
            self.connections.remove_if(identity, |_, conns| conns.is_empty());
            self.broadcast_presence(identity, false);
        }
        went_offline
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.connections
            .get(identity)
            .is_some_and(|conns| !conns.is_empty())
    }

    /// Connection ids currently held by an identity
    pub fn connections_for(&self, identity: &str) -> Vec<String> {
        self.connections
            .get(identity)
            .map(|conns| conns.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total live connections across all identities
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.len()).sum()
    }

    /// Send an event to every connection of an identity. Returns the
    /// number of handles reached; 0 means the identity is offline.
    pub fn send_to_identity(&self, identity: &str, event: &ServerEvent) -> usize {
        match self.connections.get(identity) {
            Some(conns) => conns.values().filter(|c| c.send_event(event)).count(),
            None => 0,
        }
    }

    /// Send an event to one specific connection
    pub fn send_to_connection(&self, identity: &str, conn_id: &str, event: &ServerEvent) -> bool {
        self.connections
            .get(identity)
            .and_then(|conns| conns.get(conn_id).map(|c| c.send_event(event)))
            .unwrap_or(false)
    }

    /// Presence transition, broadcast to every peer of the identity
    fn broadcast_presence(&self, identity: &str, online: bool) {
        let event = ServerEvent::Presence {
            identity: identity.to_string(),
            online,
        };
        let mut reached = 0;
        for entry in self.connections.iter() {
            if entry.key() == identity {
                continue;
            }
            reached += entry.values().filter(|c| c.send_event(&event)).count();
        }
        debug!(
            "presence {} -> online={} (reached {} connections)",
            identity, online, reached
        );
    }

    /// Add a connection to a room
    pub fn join_room(&self, room: &str, identity: &str, conn_id: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert((identity.to_string(), conn_id.to_string()));
    }

    /// Remove a connection from a room
    pub fn leave_room(&self, room: &str, identity: &str, conn_id: &str) -> Result<()> {
        let mut members = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| RelayError::RoomNotFound(room.to_string()))?;
        members.remove(&(identity.to_string(), conn_id.to_string()));
        Ok(())
    }

    /// Drop a closing connection from every room it joined
    pub fn remove_connection_from_rooms(&self, identity: &str, conn_id: &str) {
        let member = (identity.to_string(), conn_id.to_string());
        self.rooms.retain(|_, members| {
            members.remove(&member);
            !members.is_empty()
        });
    }

    /// Members currently joined to a room
    pub fn room_members(&self, room: &str) -> Vec<RoomMember> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fan an event out to a room without touching the identity map's
    /// membership state. Returns the number of connections reached.
    pub fn broadcast_to_room(
        &self,
        room: &str,
        event: &ServerEvent,
        exclude_conn: Option<&str>,
    ) -> usize {
        let members = self.room_members(room);

        let mut delivered = 0;
        for (identity, conn_id) in members {
            if exclude_conn == Some(conn_id.as_str()) {
                continue;
            }
            if self.send_to_connection(&identity, &conn_id, event) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Profile lookup through the short-TTL cache
    pub async fn profile(&self, identity: &str) -> Option<UserProfile> {
        if let Some(cached) = self.profiles.get(identity) {
            if cached.cached_at.elapsed() < self.profile_ttl {
                return Some(cached.profile.clone());
            }
        }

        match self.users.find(&[identity.to_string()]).await {
            Ok(profiles) => {
                let profile = profiles.into_iter().next()?;
                self.profiles.insert(
                    identity.to_string(),
                    CachedProfile {
                        profile: profile.clone(),
                        cached_at: Instant::now(),
                    },
                );
                Some(profile)
            }
            Err(e) => {
                warn!("user directory lookup failed for {}: {}", identity, e);
                None
            }
        }
    }

    /// Display name with fallback to the raw identity
    pub async fn display_name(&self, identity: &str) -> String {
        self.profile(identity)
            .await
            .map(|p| p.display_name)
            .unwrap_or_else(|| identity.to_string())
    }

    /// Drop expired profile cache entries
    pub fn sweep_profiles(&self) {
        let ttl = self.profile_ttl;
        self.profiles.retain(|_, cached| cached.cached_at.elapsed() < ttl);
    }

    /// Spawn the periodic profile-cache sweep, bounding memory
    pub fn start_sweeper(self: Arc<Self>, period: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.sweep_profiles();
            }
        });
    }
}
