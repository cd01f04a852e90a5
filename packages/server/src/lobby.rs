//! Players waiting for, or taking part in, a game.

use thiserror::Error;
use trivia_ws::models::LobbyPayload;

use crate::ws::ConnId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddUserError {
    #[error("username {0} already in use")]
    UsernameTaken(String),
    #[error("username must not be empty")]
    EmptyUsername,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LobbyUser {
    uname: String,
    conn: ConnId,
}

/// Usernames in join order, each bound to its connection, plus the player
/// limit chosen by the first player.
#[derive(Debug, Default)]
pub struct Lobby {
    users: Vec<LobbyUser>,
    user_limit: Option<u16>,
}

impl Lobby {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    #[must_use]
    pub const fn user_limit(&self) -> Option<u16> {
        self.user_limit
    }

    /// Does not validate the limit; see [`trivia_ws::models::parse_user_limit`].
    pub const fn set_user_limit(&mut self, limit: u16) {
        self.user_limit = Some(limit);
    }

    /// Whether a limit is set and the lobby has reached it.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.user_limit
            .is_some_and(|limit| self.users.len() >= usize::from(limit))
    }

    #[must_use]
    pub fn has_user(&self, uname: &str) -> bool {
        self.users.iter().any(|x| x.uname == uname)
    }

    /// # Errors
    ///
    /// * If the username is blank
    /// * If another player already uses the username
    pub fn add_user(&mut self, uname: &str, conn: ConnId) -> Result<(), AddUserError> {
        let uname = uname.trim();

        if uname.is_empty() {
            return Err(AddUserError::EmptyUsername);
        }
        if self.has_user(uname) {
            return Err(AddUserError::UsernameTaken(uname.to_string()));
        }

        self.users.push(LobbyUser {
            uname: uname.to_string(),
            conn,
        });

        Ok(())
    }

    /// Removes the player bound to `conn`, returning their username.
    ///
    /// Clears the player limit when the last player leaves, so the next
    /// player to join chooses it again.
    pub fn remove_conn(&mut self, conn: ConnId) -> Option<String> {
        let index = self.users.iter().position(|x| x.conn == conn)?;
        let user = self.users.remove(index);

        if self.users.is_empty() {
            self.user_limit = None;
        }

        Some(user.uname)
    }

    /// Removes the player named `uname`, returning whether they were present.
    pub fn remove_user(&mut self, uname: &str) -> bool {
        let Some(conn) = self
            .users
            .iter()
            .find(|x| x.uname == uname)
            .map(|x| x.conn)
        else {
            return false;
        };

        self.remove_conn(conn).is_some()
    }

    #[must_use]
    pub fn uname(&self, conn: ConnId) -> Option<&str> {
        self.users
            .iter()
            .find(|x| x.conn == conn)
            .map(|x| x.uname.as_str())
    }

    /// The first player still in the lobby. They are asked to start the game.
    #[must_use]
    pub fn host(&self) -> Option<ConnId> {
        self.users.first().map(|x| x.conn)
    }

    #[must_use]
    pub fn current_users(&self) -> Vec<String> {
        self.users.iter().map(|x| x.uname.clone()).collect()
    }

    pub fn conns(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.users.iter().map(|x| x.conn)
    }

    #[must_use]
    pub fn payload(&self) -> LobbyPayload {
        LobbyPayload {
            count: self.len(),
            uname_list: self.current_users(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn add_user_keeps_join_order() {
        let mut lobby = Lobby::new();

        lobby.add_user("bob", 1).unwrap();
        lobby.add_user("ann", 2).unwrap();

        assert_eq!(lobby.current_users(), vec!["bob", "ann"]);
        assert_eq!(lobby.host(), Some(1));
        assert_eq!(
            lobby.payload(),
            LobbyPayload {
                count: 2,
                uname_list: vec!["bob".into(), "ann".into()],
            }
        );
    }

    #[test_log::test]
    fn add_user_rejects_duplicate_username() {
        let mut lobby = Lobby::new();
        lobby.add_user("ann", 1).unwrap();

        assert_eq!(
            lobby.add_user("ann", 2),
            Err(AddUserError::UsernameTaken("ann".into()))
        );
        assert_eq!(lobby.len(), 1);
    }

    #[test_log::test]
    fn add_user_rejects_blank_username() {
        let mut lobby = Lobby::new();

        assert_eq!(lobby.add_user("   ", 1), Err(AddUserError::EmptyUsername));
        assert!(lobby.is_empty());
    }

    #[test_log::test]
    fn add_user_trims_username() {
        let mut lobby = Lobby::new();
        lobby.add_user("  ann ", 1).unwrap();

        assert!(lobby.has_user("ann"));
        assert_eq!(lobby.uname(1), Some("ann"));
    }

    #[test_log::test]
    fn is_full_requires_a_limit() {
        let mut lobby = Lobby::new();
        lobby.add_user("ann", 1).unwrap();
        lobby.add_user("bob", 2).unwrap();
        assert!(!lobby.is_full());

        lobby.set_user_limit(2);
        assert!(lobby.is_full());

        lobby.set_user_limit(3);
        assert!(!lobby.is_full());
    }

    #[test_log::test]
    fn host_moves_to_next_player_when_host_leaves() {
        let mut lobby = Lobby::new();
        lobby.add_user("ann", 1).unwrap();
        lobby.add_user("bob", 2).unwrap();
        lobby.set_user_limit(2);

        assert_eq!(lobby.remove_conn(1), Some("ann".into()));
        assert_eq!(lobby.host(), Some(2));
        assert_eq!(lobby.user_limit(), Some(2));
    }

    #[test_log::test]
    fn emptied_lobby_clears_limit() {
        let mut lobby = Lobby::new();
        lobby.add_user("ann", 1).unwrap();
        lobby.set_user_limit(4);

        lobby.remove_conn(1);

        assert_eq!(lobby.user_limit(), None);
    }

    #[test_log::test]
    fn remove_user_by_name() {
        let mut lobby = Lobby::new();
        lobby.add_user("ann", 1).unwrap();
        lobby.add_user("bob", 2).unwrap();

        assert!(lobby.remove_user("ann"));
        assert!(!lobby.remove_user("ann"));
        assert_eq!(lobby.current_users(), vec!["bob"]);
    }

    #[test_log::test]
    fn remove_unknown_conn_is_noop() {
        let mut lobby = Lobby::new();
        lobby.add_user("ann", 1).unwrap();

        assert_eq!(lobby.remove_conn(7), None);
        assert_eq!(lobby.len(), 1);
    }
}
