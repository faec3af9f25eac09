//! Line prefix (source) parsing.
//!
//! A prefix is either a server name (`tmi.twitch.tv`) or a user mask
//! (`nick!user@nick.tmi.twitch.tv`).

/// Line prefix - identifies the origin of a line.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Prefix {
    /// Server name (e.g., "tmi.twitch.tv")
    ServerName(String),
    /// User prefix: (nickname, username, hostname)
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix string into a Prefix.
    ///
    /// This is a lenient parser that does not validate the components.
    pub fn new_from_str(s: &str) -> Self {
        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Part {
            Name,
            User,
            Host,
        }

        let mut name = String::new();
        let mut user = String::new();
        let mut host = String::new();
        let mut part = Part::Name;
        let mut is_server = false;

        for c in s.chars() {
            // A dot in the name part (before ! or @) suggests server name
            if c == '.' && part == Part::Name {
                is_server = true;
            }

            match c {
                '!' if part == Part::Name => {
                    is_server = false;
                    part = Part::User;
                }
                '@' if part != Part::Host => {
                    is_server = false;
                    part = Part::Host;
                }
                _ => {
                    match part {
                        Part::Name => &mut name,
                        Part::User => &mut user,
                        Part::Host => &mut host,
                    }
                    .push(c);
                }
            }
        }

        if is_server {
            Prefix::ServerName(name)
        } else {
            Prefix::Nickname(name, user, host)
        }
    }

    /// Get the nickname if this is a user prefix.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }

    /// Get the username if this is a user prefix.
    pub fn user(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(_, user, _) if !user.is_empty() => Some(user),
            _ => None,
        }
    }

    /// Get the hostname (or server name).
    pub fn host(&self) -> Option<&str> {
        match self {
            Prefix::ServerName(name) => Some(name),
            Prefix::Nickname(_, _, host) if !host.is_empty() => Some(host),
            _ => None,
        }
    }

    /// The actor behind a `nick!user@host` mask: the token between `!` and `@`.
    ///
    /// `None` for server prefixes and bare nicknames.
    pub fn author(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(_, user, host) if !host.is_empty() => {
                (!user.is_empty()).then_some(user.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prefix() {
        let prefix = Prefix::new_from_str("ninja!ninja@ninja.tmi.twitch.tv");
        assert_eq!(prefix.nick(), Some("ninja"));
        assert_eq!(prefix.user(), Some("ninja"));
        assert_eq!(prefix.host(), Some("ninja.tmi.twitch.tv"));
        assert_eq!(prefix.author(), Some("ninja"));
    }

    #[test]
    fn test_server_prefix() {
        let prefix = Prefix::new_from_str("tmi.twitch.tv");
        assert_eq!(prefix, Prefix::ServerName("tmi.twitch.tv".to_string()));
        assert_eq!(prefix.author(), None);
    }

    #[test]
    fn test_bare_nick_has_no_author() {
        let prefix = Prefix::new_from_str("jtv");
        assert_eq!(prefix.nick(), Some("jtv"));
        assert_eq!(prefix.author(), None);
    }

    #[test]
    fn test_author_is_user_part() {
        let prefix = Prefix::new_from_str("Display!login@login.tmi.twitch.tv");
        assert_eq!(prefix.author(), Some("login"));
    }
}
