//! Checks run on user input before anything is persisted.
//!
//! Each kind also fills in the defaults its form used to supply.

use thiserror::Error;

use crate::models::*;

/**
 * Label used for secret messages sent without a name
 */
pub const ANONYMOUS: &str = "Anônimo";

#[derive(Debug, Error, PartialEq)]
pub enum Invalid {
    #[error("Missing required field `{0}`")]
    Missing(&'static str),

    #[error("Someone is already bringing {0}")]
    DuplicateFood(String),

    #[error("{0} is already in the queue")]
    DuplicateTrack(String),

    #[error("At most {max} wishes are allowed, got {got}")]
    TooManyWishes { max: usize, got: usize },
}

impl Invalid {
    /**
     * Duplicates conflict with existing records, everything else is a bad request
     */
    pub fn is_conflict(&self) -> bool {
        matches!(self, Invalid::DuplicateFood(_) | Invalid::DuplicateTrack(_))
    }
}

/**
 * Validate `self` against the current collection and normalize it for saving
 */
pub trait Validate: Sized {
    fn check(&mut self, existing: &[Self]) -> Result<(), Invalid>;
}

fn require(value: &str, field: &'static str) -> Result<(), Invalid> {
    if value.trim().is_empty() {
        Err(Invalid::Missing(field))
    }
    else {
        Ok(())
    }
}

impl Validate for Participant {
    fn check(&mut self, _existing: &[Self]) -> Result<(), Invalid> {
        require(&self.id, "id")?;
        require(&self.name, "name")?;

        if self.wishes.len() > WISH_SLOTS {
            return Err(Invalid::TooManyWishes {
                max: WISH_SLOTS,
                got: self.wishes.len(),
            });
        }
        while self.wishes.len() < WISH_SLOTS {
            self.wishes.push(Gift::blank());
        }
        Ok(())
    }
}

fn dish(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Validate for FoodItem {
    fn check(&mut self, existing: &[Self]) -> Result<(), Invalid> {
        require(&self.id, "id")?;
        require(&self.contributor_name, "contributorName")?;
        require(&self.name, "name")?;
        require(&self.image, "image")?;

        let name = dish(&self.name);
        if existing
            .iter()
            .any(|food| food.id != self.id && dish(&food.name) == name)
        {
            return Err(Invalid::DuplicateFood(self.name.trim().to_string()));
        }

        if self.contributor_avatar.trim().is_empty() {
            self.contributor_avatar = format!(
                "https://api.dicebear.com/7.x/avataaars/svg?seed={}",
                self.contributor_name.trim()
            );
        }
        Ok(())
    }
}

impl Validate for Vote {
    fn check(&mut self, _existing: &[Self]) -> Result<(), Invalid> {
        require(&self.id, "id")?;
        require(&self.guess_id, "guessId")
    }
}

impl Validate for MusicRequest {
    fn check(&mut self, existing: &[Self]) -> Result<(), Invalid> {
        require(&self.id, "id")?;
        require(&self.title, "title")?;

        if let Some(track) = self.track_id.as_deref() {
            if existing
                .iter()
                .any(|song| song.id != self.id && song.track_id.as_deref() == Some(track))
            {
                return Err(Invalid::DuplicateTrack(self.title.clone()));
            }
        }
        Ok(())
    }
}

impl Validate for SecretMessage {
    fn check(&mut self, _existing: &[Self]) -> Result<(), Invalid> {
        require(&self.id, "id")?;
        require(&self.content, "content")?;

        if self.sender.trim().is_empty() {
            self.sender = ANONYMOUS.to_string();
        }
        Ok(())
    }
}

impl Validate for Poll {
    fn check(&mut self, _existing: &[Self]) -> Result<(), Invalid> {
        require(&self.id, "id")?;
        require(&self.title, "title")
    }
}

impl Validate for PollOption {
    /**
     * The vote counter belongs to the store, whatever the client sent is replaced
     */
    fn check(&mut self, existing: &[Self]) -> Result<(), Invalid> {
        require(&self.id, "id")?;
        require(&self.poll_id, "pollId")?;
        require(&self.name, "name")?;

        self.votes = existing
            .iter()
            .find(|option| option.id == self.id)
            .map_or(0, |option| option.votes);
        Ok(())
    }
}

impl Validate for PollVote {
    fn check(&mut self, _existing: &[Self]) -> Result<(), Invalid> {
        require(&self.poll_id, "pollId")?;
        require(&self.option_id, "optionId")?;
        require(&self.participant_id, "participantId")?;
        self.id = PollVote::key(&self.participant_id, &self.poll_id);
        Ok(())
    }
}
