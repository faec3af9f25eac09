//! Joined channels and their members.
//!
//! Every mutation checks existence first and reports an inconsistency as a
//! [`RegistryError`] without touching state. Member lists keep join order.

use std::collections::HashMap;

use crate::error::RegistryError;

/// Channel name → members in join order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRegistry {
    channels: HashMap<String, Vec<String>>,
    generation: u64,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel the local identity joined. Joining an already
    /// known channel keeps its member list.
    pub fn add_channel(&mut self, channel: &str) {
        if !self.channels.contains_key(channel) {
            self.channels.insert(channel.to_owned(), Vec::new());
            self.generation += 1;
        }
    }

    /// Forget a channel the local identity left.
    pub fn remove_channel(&mut self, channel: &str) -> Result<Vec<String>, RegistryError> {
        let members = self
            .channels
            .remove(channel)
            .ok_or_else(|| RegistryError::UnknownChannel(channel.to_owned()))?;
        self.generation += 1;
        Ok(members)
    }

    /// Append a member. A member already listed is not added twice.
    pub fn add_member(&mut self, channel: &str, member: &str) -> Result<(), RegistryError> {
        let members = self
            .channels
            .get_mut(channel)
            .ok_or_else(|| RegistryError::UnknownChannel(channel.to_owned()))?;
        if !members.iter().any(|m| m == member) {
            members.push(member.to_owned());
            self.generation += 1;
        }
        Ok(())
    }

    /// Remove a member.
    pub fn remove_member(&mut self, channel: &str, member: &str) -> Result<(), RegistryError> {
        let members = self
            .channels
            .get_mut(channel)
            .ok_or_else(|| RegistryError::UnknownChannel(channel.to_owned()))?;
        let pos = members
            .iter()
            .position(|m| m == member)
            .ok_or_else(|| RegistryError::UnknownMember {
                channel: channel.to_owned(),
                member: member.to_owned(),
            })?;
        members.remove(pos);
        self.generation += 1;
        Ok(())
    }

    /// Append a whitespace-separated snapshot of members.
    pub fn add_snapshot(&mut self, channel: &str, names: &str) -> Result<(), RegistryError> {
        if !self.channels.contains_key(channel) {
            return Err(RegistryError::UnknownChannel(channel.to_owned()));
        }
        for name in names.split_whitespace() {
            self.add_member(channel, name)?;
        }
        Ok(())
    }

    /// Members of a channel, in join order.
    pub fn members(&self, channel: &str) -> Option<&[String]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    /// Whether the channel is known.
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Known channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of known channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is known.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Counter bumped on every change; lets observers skip unchanged copies.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop everything, as after a reconnect.
    pub fn clear(&mut self) {
        if !self.channels.is_empty() {
            self.channels.clear();
            self.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_order() {
        let mut reg = ChannelRegistry::new();
        reg.add_channel("ninja");
        reg.add_member("ninja", "b").unwrap();
        reg.add_member("ninja", "a").unwrap();
        reg.add_member("ninja", "b").unwrap();
        assert_eq!(reg.members("ninja").unwrap(), ["b", "a"]);
    }

    #[test]
    fn test_unknown_channel_is_an_error_without_effect() {
        let mut reg = ChannelRegistry::new();
        let before = reg.clone();
        assert_eq!(
            reg.add_member("nowhere", "a"),
            Err(RegistryError::UnknownChannel("nowhere".into()))
        );
        assert_eq!(reg, before);
    }

    #[test]
    fn test_remove_member() {
        let mut reg = ChannelRegistry::new();
        reg.add_channel("c");
        reg.add_snapshot("c", "a b  c").unwrap();
        reg.remove_member("c", "b").unwrap();
        assert_eq!(reg.members("c").unwrap(), ["a", "c"]);
        assert_eq!(
            reg.remove_member("c", "zz"),
            Err(RegistryError::UnknownMember {
                channel: "c".into(),
                member: "zz".into()
            })
        );
    }

    #[test]
    fn test_remove_channel() {
        let mut reg = ChannelRegistry::new();
        reg.add_channel("c");
        assert!(reg.remove_channel("c").is_ok());
        assert!(!reg.contains("c"));
        assert!(reg.remove_channel("c").is_err());
    }

    #[test]
    fn test_generation_tracks_changes() {
        let mut reg = ChannelRegistry::new();
        let g0 = reg.generation();
        reg.add_channel("c");
        let g1 = reg.generation();
        assert!(g1 > g0);
        reg.add_channel("c");
        assert_eq!(reg.generation(), g1);
    }
}
