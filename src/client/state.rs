//! Connection state types for the NNTP client

/// NNTP connection state
///
/// The posting flow walks `Connected` → `Authenticated` → (`PostInFlight` →
/// `Authenticated`)* → `Closed`. Group membership is tracked separately on
/// the client since it survives posting transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConnectionState {
    /// Connected, greeting consumed, not yet authenticated
    Connected,
    /// AUTHINFO exchange accepted (or not required)
    Authenticated,
    /// POST accepted (340), article body being transmitted
    PostInFlight,
    /// QUIT sent or socket abandoned
    Closed,
}
