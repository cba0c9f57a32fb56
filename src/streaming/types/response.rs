//! Entities carried by streaming events.
//!
//! Servers differ in which fields they send, so every field has a default and a
//! payload missing any of them still decodes.

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serde_helpers::string_or_number;

/// A post delivered by the `update` event.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Status {
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub uri: String,
    pub url: Option<String>,
    pub account: Account,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_account_id: Option<String>,
    /// The boosted post when this status is a reblog
    pub reblog: Option<Box<Status>>,
    /// HTML-encoded body
    #[builder(default, into)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[builder(default)]
    pub emojis: Vec<Emoji>,
    #[builder(default)]
    pub replies_count: u64,
    #[builder(default)]
    pub reblogs_count: u64,
    #[builder(default)]
    pub favourites_count: u64,
    pub reblogged: Option<bool>,
    pub favourited: Option<bool>,
    pub muted: Option<bool>,
    #[builder(default)]
    pub sensitive: bool,
    #[builder(default, into)]
    pub spoiler_text: String,
    #[builder(default)]
    pub visibility: Visibility,
    #[builder(default)]
    pub media_attachments: Vec<Attachment>,
    #[builder(default)]
    pub mentions: Vec<Mention>,
    #[builder(default)]
    pub tags: Vec<Tag>,
    pub application: Option<Application>,
    pub language: Option<String>,
    pub pinned: Option<bool>,
}

#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
    /// A visibility this crate does not know about
    #[serde(other)]
    Unknown,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Account {
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub username: String,
    /// `username` for local accounts, `username@domain` for remote ones
    #[builder(into)]
    pub acct: String,
    #[builder(default, into)]
    pub display_name: String,
    #[builder(default)]
    pub locked: bool,
    pub bot: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub followers_count: u64,
    #[builder(default)]
    pub following_count: u64,
    #[builder(default)]
    pub statuses_count: u64,
    #[builder(default, into)]
    pub note: String,
    #[builder(default, into)]
    pub url: String,
    #[builder(default, into)]
    pub avatar: String,
    #[builder(default, into)]
    pub avatar_static: String,
    #[builder(default, into)]
    pub header: String,
    #[builder(default, into)]
    pub header_static: String,
    #[builder(default)]
    pub emojis: Vec<Emoji>,
    /// Set when the account has migrated elsewhere
    pub moved: Option<Box<Account>>,
}

/// Custom emoji.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Emoji {
    #[builder(into)]
    pub shortcode: String,
    #[builder(into)]
    pub url: String,
    #[builder(default, into)]
    pub static_url: String,
    #[builder(default)]
    pub visible_in_picker: bool,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Attachment {
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub id: String,
    #[serde(rename = "type")]
    #[builder(default)]
    pub kind: AttachmentType,
    #[builder(into)]
    pub url: String,
    pub remote_url: Option<String>,
    pub preview_url: Option<String>,
    pub text_url: Option<String>,
    pub description: Option<String>,
}

#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttachmentType {
    Image,
    Gifv,
    Video,
    Audio,
    #[default]
    #[serde(other)]
    Unknown,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Mention {
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub username: String,
    #[builder(into)]
    pub acct: String,
    #[builder(default, into)]
    pub url: String,
}

/// Hashtag used in a status.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Tag {
    #[builder(into)]
    pub name: String,
    #[builder(default, into)]
    pub url: String,
}

/// Client application a status was posted with.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Application {
    #[builder(into)]
    pub name: String,
    pub website: Option<String>,
}

/// Payload of the `notification` event.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Notification {
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub created_at: DateTime<Utc>,
    pub account: Account,
    /// The status the notification refers to, absent for follows
    pub status: Option<Box<Status>>,
}

#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    Mention,
    Reblog,
    Favourite,
    Follow,
    FollowRequest,
    Poll,
    Status,
    Update,
    /// Emoji reaction, sent by servers that support them
    EmojiReaction,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Payload of the `conversation` event for direct-message threads.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Builder)]
#[serde(default)]
pub struct Conversation {
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub id: String,
    #[builder(default)]
    pub accounts: Vec<Account>,
    pub last_status: Option<Box<Status>>,
    #[builder(default)]
    pub unread: bool,
}
