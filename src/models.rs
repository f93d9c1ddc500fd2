use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/**
 * Number of gift wishes every participant carries
 */
pub const WISH_SLOTS: usize = 3;

/**
 * Generate a new identifier for a record
 */
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/**
 * Milliseconds since the epoch, the unit `createdAt` is stored in
 */
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/**
 * The collections kept in sync
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Participants,
    Foods,
    Votes,
    Music,
    Secrets,
    Polls,
    PollOptions,
    PollVotes,
}

impl Kind {
    /**
     * Name of the collection in the remote store and in the HTTP paths
     */
    pub fn collection(self) -> &'static str {
        match self {
            Kind::Participants => "participants",
            Kind::Foods => "foods",
            Kind::Votes => "votes",
            Kind::Music => "music",
            Kind::Secrets => "secrets",
            Kind::Polls => "polls",
            Kind::PollOptions => "poll_options",
            Kind::PollVotes => "poll_votes",
        }
    }

    /**
     * Key holding the JSON array of this kind in the local fallback
     */
    pub fn storage_key(self) -> &'static str {
        match self {
            Kind::Participants => "north_pole_registry",
            Kind::Foods => "north_pole_food",
            Kind::Votes => "north_pole_votes",
            Kind::Music => "north_pole_music",
            Kind::Secrets => "north_pole_secrets",
            Kind::Polls => "north_pole_polls",
            Kind::PollOptions => "north_pole_poll_options",
            Kind::PollVotes => "north_pole_poll_votes",
        }
    }
}

/**
 * A record that lives in one of the synchronized collections
 */
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    const KIND: Kind;

    fn id(&self) -> &str;

    /**
     * Put a snapshot into the order subscribers expect, insertion order by default
     */
    fn order(_items: &mut [Self]) {}

    /**
     * Carry over fields the store owns from the record being replaced
     */
    fn keep_stored(&mut self, _stored: &Self) {}
}

/**
 * Marker for the kinds that may be removed from their collection
 */
pub trait Deletable: Entity {}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    #[serde(default = "generate_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ai_generated: Option<bool>,
}

impl Gift {
    pub fn blank() -> Self {
        Self {
            id: generate_id(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default = "generate_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub interests: String,
    #[serde(default)]
    pub wishes: Vec<Gift>,
}

impl Entity for Participant {
    const KIND: Kind = Kind::Participants;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    #[serde(default = "generate_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub contributor_name: String,
    #[serde(default)]
    pub contributor_avatar: String,
}

impl Entity for FoodItem {
    const KIND: Kind = Kind::Foods;

    fn id(&self) -> &str {
        &self.id
    }
}

/**
 * A guess in the "who picked whom" quiz
 *
 * The id is the voter's participant id, so a voter holds at most one vote
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: String,
    #[serde(default)]
    pub voter_name: String,
    pub guess_id: String,
    #[serde(default)]
    pub guess_name: String,
}

impl Entity for Vote {
    const KIND: Kind = Kind::Votes;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Deletable for Vote {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicRequest {
    #[serde(default = "generate_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    /**
     * Stable identifier of the track in the external media catalogue
     */
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub requester_id: String,
    #[serde(default)]
    pub requester_name: String,
    #[serde(default = "now_millis")]
    pub created_at: i64,
}

impl MusicRequest {
    /**
     * The head of an ordered queue is what is playing
     */
    pub fn now_playing(queue: &[MusicRequest]) -> Option<&MusicRequest> {
        queue.first()
    }
}

impl Entity for MusicRequest {
    const KIND: Kind = Kind::Music;

    fn id(&self) -> &str {
        &self.id
    }

    fn order(items: &mut [Self]) {
        items.sort_by_key(|m| m.created_at);
    }
}

impl Deletable for MusicRequest {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMessage {
    #[serde(default = "generate_id")]
    pub id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: String,
    pub content: String,
    #[serde(default = "now_millis")]
    pub created_at: i64,
}

impl Entity for SecretMessage {
    const KIND: Kind = Kind::Secrets;

    fn id(&self) -> &str {
        &self.id
    }

    fn order(items: &mut [Self]) {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

impl Deletable for SecretMessage {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    #[serde(default = "generate_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Entity for Poll {
    const KIND: Kind = Kind::Polls;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    #[serde(default = "generate_id")]
    pub id: String,
    pub poll_id: String,
    pub name: String,
    /**
     * Denormalized count of poll votes pointing at this option
     */
    #[serde(default)]
    pub votes: i64,
}

impl Entity for PollOption {
    const KIND: Kind = Kind::PollOptions;

    fn id(&self) -> &str {
        &self.id
    }

    /**
     * Only poll votes move the counter
     */
    fn keep_stored(&mut self, stored: &Self) {
        self.votes = stored.votes;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVote {
    #[serde(default)]
    pub id: String,
    pub poll_id: String,
    pub option_id: String,
    pub participant_id: String,
    #[serde(default)]
    pub participant_name: String,
    #[serde(default)]
    pub option_name: String,
}

impl PollVote {
    /**
     * The fixed key of a participant's vote in a poll
     */
    pub fn key(participant_id: &str, poll_id: &str) -> String {
        format!("{}_{}", participant_id, poll_id)
    }
}

impl Entity for PollVote {
    const KIND: Kind = Kind::PollVotes;

    fn id(&self) -> &str {
        &self.id
    }
}
