use serde::{Deserialize, Serialize};

use crate::models::{Poll, PollOption, PollVote};

/**
 * User-provided ballot for one poll
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub participant_id: String,
    #[serde(default)]
    pub participant_name: String,
    pub option_id: String,
    #[serde(default)]
    pub option_name: String,
    /**
     * The option this participant voted for before, if they are changing their vote
     */
    #[serde(default)]
    pub previous_option_id: Option<String>,
}

impl Ballot {
    pub fn into_vote(self, poll_id: String) -> (PollVote, Option<String>) {
        let vote = PollVote {
            id: PollVote::key(&self.participant_id, &poll_id),
            poll_id,
            option_id: self.option_id,
            participant_id: self.participant_id,
            participant_name: self.participant_name,
            option_name: self.option_name,
        };
        (vote, self.previous_option_id)
    }
}

/**
 * Results from a given poll, options with the most votes first
 */
#[derive(Debug, Serialize)]
pub struct Tally {
    pub poll: Poll,
    pub options: Vec<PollOption>,
    pub total: i64,
}

impl Tally {
    pub fn new(poll: Poll, mut options: Vec<PollOption>) -> Self {
        options.retain(|o| o.poll_id == poll.id);
        options.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));
        let total = options.iter().map(|o| o.votes).sum();
        Self { poll, options, total }
    }
}
