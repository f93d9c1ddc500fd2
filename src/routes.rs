//! The routes module contains all the tide routes and the logic to fulfill the responses for each
//! route.
//!
//! Modules are nested for cleaner organization here
use log::*;
use serde_json::json;
use tide::{Request, Response, StatusCode};

use crate::models::*;
use crate::status::Status;
use crate::validate::Invalid;
use crate::AppState;

/**
 * Wire every route into the app
 */
pub fn register(app: &mut tide::Server<AppState>) {
    app.at("/").get(index);
    app.at("/api/v1/status").get(status);

    app.at("/api/v1/participants")
        .get(collections::list::<Participant>)
        .put(collections::save::<Participant>);
    app.at("/api/v1/participants/events").get(collections::events::<Participant>());

    app.at("/api/v1/foods")
        .get(collections::list::<FoodItem>)
        .put(collections::save::<FoodItem>);
    app.at("/api/v1/foods/events").get(collections::events::<FoodItem>());

    app.at("/api/v1/votes")
        .get(collections::list::<Vote>)
        .put(collections::save::<Vote>);
    app.at("/api/v1/votes/events").get(collections::events::<Vote>());
    app.at("/api/v1/votes/:id").delete(collections::delete::<Vote>);

    app.at("/api/v1/music")
        .get(collections::list::<MusicRequest>)
        .put(collections::save::<MusicRequest>);
    app.at("/api/v1/music/events").get(collections::events::<MusicRequest>());
    app.at("/api/v1/music/skip").post(music::skip);
    app.at("/api/v1/music/:id").delete(collections::delete::<MusicRequest>);

    app.at("/api/v1/secrets")
        .get(collections::list::<SecretMessage>)
        .put(collections::save::<SecretMessage>);
    app.at("/api/v1/secrets/events").get(collections::events::<SecretMessage>());
    app.at("/api/v1/secrets/:id").delete(collections::delete::<SecretMessage>);

    app.at("/api/v1/polls")
        .get(collections::list::<Poll>)
        .put(collections::save_admin::<Poll>);
    app.at("/api/v1/polls/events").get(collections::events::<Poll>());
    app.at("/api/v1/polls/:id/vote").post(polls::vote);
    app.at("/api/v1/polls/:id/results").get(polls::results);

    app.at("/api/v1/poll_options")
        .get(collections::list::<PollOption>)
        .put(collections::save_admin::<PollOption>);
    app.at("/api/v1/poll_options/events").get(collections::events::<PollOption>());

    app.at("/api/v1/poll_votes").get(collections::list::<PollVote>);
    app.at("/api/v1/poll_votes/events").get(collections::events::<PollVote>());
}

/**
 * Turn a validation failure into the matching client error
 */
fn rejected(invalid: Invalid) -> tide::Error {
    let status = if invalid.is_conflict() {
        StatusCode::Conflict
    }
    else {
        StatusCode::BadRequest
    };
    tide::Error::from_str(status, invalid.to_string())
}

/**
 * Admin actions need the shared passcode in `X-Passcode`
 */
fn authorize(req: &Request<AppState>) -> Result<(), tide::Error> {
    let given = req.header("X-Passcode").map(|v| v.last().as_str().trim().to_string());

    match (&req.state().passcode, given) {
        (None, _) => Err(tide::Error::from_str(StatusCode::Forbidden, "Admin actions are disabled")),
        (Some(code), Some(given)) if *code == given => Ok(()),
        _ => {
            warn!("Rejected admin request with a wrong passcode");
            Err(tide::Error::from_str(StatusCode::Forbidden, "Wrong passcode"))
        }
    }
}

fn required_param(req: &Request<AppState>, name: &str) -> Result<String, tide::Error> {
    match req.param::<String>(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(tide::Error::from_str(
            StatusCode::BadRequest,
            format!("No {} specified", name),
        )),
    }
}

async fn fetch_or_fail<T: Entity>(state: &AppState) -> Result<Vec<T>, tide::Error> {
    state.adapter.fetch::<T>().await.map_err(|err| {
        error!("Failed to read {}: {}", T::KIND.collection(), err);
        tide::Error::from_str(StatusCode::InternalServerError, "Failed to read collection")
    })
}

async fn count<T: Entity>(state: &AppState) -> usize {
    state.adapter.fetch::<T>().await.map_or(0, |items| items.len())
}

/**
 *  GET /
 */
pub async fn index(req: Request<AppState>) -> Result<Response, tide::Error> {
    let state = req.state();
    let status = Status::of(&state.adapter, &state.board);
    let music: Vec<MusicRequest> = state.adapter.fetch().await.unwrap_or_default();
    let counts = vec![
        json!({ "name": "participants", "count": count::<Participant>(state).await }),
        json!({ "name": "foods", "count": count::<FoodItem>(state).await }),
        json!({ "name": "votes", "count": count::<Vote>(state).await }),
        json!({ "name": "secrets", "count": count::<SecretMessage>(state).await }),
        json!({ "name": "polls", "count": count::<Poll>(state).await }),
    ];

    let data = json!({
        "status": status,
        "nowPlaying": MusicRequest::now_playing(&music),
        "queued": music.len(),
        "counts": counts,
    });

    let page = state.templates.render("index", &data)?;
    Ok(Response::builder(StatusCode::Ok)
        .body(page)
        .content_type(tide::http::mime::HTML)
        .build())
}

/**
 *  GET /api/v1/status
 */
pub async fn status(req: Request<AppState>) -> Result<tide::Body, tide::Error> {
    let state = req.state();
    tide::Body::from_json(&Status::of(&state.adapter, &state.board))
}

pub mod collections {
    use async_std::channel;
    use log::*;
    use std::sync::{Arc, Mutex, PoisonError};
    use tide::{Body, Endpoint, Request, Response, StatusCode};

    use super::{authorize, fetch_or_fail, rejected, required_param};
    use crate::models::{Deletable, Entity};
    use crate::validate::Validate;
    use crate::AppState;

    /**
     *  GET /api/v1/<collection>
     */
    pub async fn list<T: Entity>(req: Request<AppState>) -> Result<Body, tide::Error> {
        Body::from_json(&fetch_or_fail::<T>(req.state()).await?)
    }

    /**
     *  PUT /api/v1/<collection>
     */
    pub async fn save<T: Entity + Validate>(mut req: Request<AppState>) -> Result<Response, tide::Error> {
        let mut entity: T = req.body_json().await?;
        debug!("{} received: {}", T::KIND.collection(), entity.id());

        let existing = fetch_or_fail::<T>(req.state()).await?;
        entity.check(&existing).map_err(rejected)?;

        if req.state().adapter.save(&entity).await {
            Ok(Response::builder(StatusCode::Created)
                .body(Body::from_json(&entity)?)
                .build())
        }
        else {
            Err(tide::Error::from_str(StatusCode::InternalServerError, "Failed to save"))
        }
    }

    /**
     *  PUT /api/v1/<collection> behind the passcode
     */
    pub async fn save_admin<T: Entity + Validate>(req: Request<AppState>) -> Result<Response, tide::Error> {
        authorize(&req)?;
        save::<T>(req).await
    }

    /**
     *  DELETE /api/v1/<collection>/:id
     */
    pub async fn delete<T: Deletable>(req: Request<AppState>) -> Result<Response, tide::Error> {
        let id = required_param(&req, "id")?;
        let existing = fetch_or_fail::<T>(req.state()).await?;

        if !existing.iter().any(|item| item.id() == id) {
            return Err(tide::Error::from_str(StatusCode::NotFound, "Could not find id"));
        }

        if req.state().adapter.delete::<T>(&id).await {
            Ok(Response::new(StatusCode::NoContent))
        }
        else {
            Err(tide::Error::from_str(StatusCode::InternalServerError, "Failed to delete"))
        }
    }

    /**
     * Holds only the newest snapshot, so a slow client skips the ones it
     * never got around to reading
     */
    #[derive(Clone)]
    pub(super) struct Latest {
        slot: Arc<Mutex<Option<String>>>,
        wake: channel::Sender<()>,
    }

    impl Latest {
        pub(super) fn new() -> (Self, channel::Receiver<()>) {
            let (wake, woken) = channel::bounded(1);
            let latest = Self {
                slot: Arc::new(Mutex::new(None)),
                wake,
            };
            (latest, woken)
        }

        pub(super) fn put(&self, json: String) {
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
            // a wake-up already pending will pick this snapshot up
            let _ = self.wake.try_send(());
        }

        pub(super) fn take(&self) -> Option<String> {
            self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
        }
    }

    /**
     *  GET /api/v1/<collection>/events
     *
     * Streams a `snapshot` event with the full collection on every change
     */
    pub fn events<T: Entity>() -> impl Endpoint<AppState> {
        tide::sse::endpoint(|req: Request<AppState>, sender: tide::sse::Sender| async move {
            let (latest, woken) = Latest::new();
            let mailbox = latest.clone();
            let subscription = req.state().adapter.subscribe(move |items: Vec<T>| {
                match serde_json::to_string(&items) {
                    Ok(json) => mailbox.put(json),
                    Err(err) => error!("Failed to serialize {}: {}", T::KIND.collection(), err),
                }
            });

            while woken.recv().await.is_ok() {
                let json = match latest.take() {
                    Some(json) => json,
                    None => continue,
                };
                if sender.send("snapshot", json, None).await.is_err() {
                    debug!("{} subscriber went away", T::KIND.collection());
                    break;
                }
            }

            subscription.unsubscribe();
            Ok(())
        })
    }
}

pub mod polls {
    use log::*;
    use tide::{Body, Request, Response, StatusCode};

    use super::{authorize, fetch_or_fail, rejected, required_param};
    use crate::api_models::{Ballot, Tally};
    use crate::models::{Poll, PollOption};
    use crate::validate::Validate;
    use crate::AppState;

    /**
     *  POST /api/v1/polls/:id/vote
     */
    pub async fn vote(mut req: Request<AppState>) -> Result<Response, tide::Error> {
        let ballot: Ballot = req.body_json().await?;
        let poll_id = required_param(&req, "id")?;
        let (mut vote, previous) = ballot.into_vote(poll_id);
        vote.check(&[]).map_err(rejected)?;

        let options = fetch_or_fail::<PollOption>(req.state()).await?;
        if !options
            .iter()
            .any(|o| o.id == vote.option_id && o.poll_id == vote.poll_id)
        {
            return Err(tide::Error::from_str(StatusCode::NotFound, "Failed to look up option"));
        }

        info!("Ballot received: {:?}", vote);
        if req
            .state()
            .adapter
            .save_poll_vote(&vote, previous.as_deref())
            .await
        {
            Ok(Response::builder(StatusCode::Created)
                .body(Body::from_json(&vote)?)
                .build())
        }
        else {
            Err(tide::Error::from_str(StatusCode::InternalServerError, "Failed to vote"))
        }
    }

    /**
     *  GET /api/v1/polls/:id/results
     */
    pub async fn results(req: Request<AppState>) -> Result<Body, tide::Error> {
        authorize(&req)?;
        let poll_id = required_param(&req, "id")?;

        let poll = fetch_or_fail::<Poll>(req.state())
            .await?
            .into_iter()
            .find(|p| p.id == poll_id);

        if let Some(poll) = poll {
            let options = fetch_or_fail::<PollOption>(req.state()).await?;
            Body::from_json(&Tally::new(poll, options))
        }
        else {
            Err(tide::Error::from_str(StatusCode::NotFound, "Failed to find poll"))
        }
    }
}

pub mod music {
    use tide::{Body, Request, Response, StatusCode};

    use super::fetch_or_fail;
    use crate::models::MusicRequest;
    use crate::AppState;

    /**
     *  POST /api/v1/music/skip
     *
     * Drops whatever is playing and answers with what plays next
     */
    pub async fn skip(req: Request<AppState>) -> Result<Response, tide::Error> {
        let queue = fetch_or_fail::<MusicRequest>(req.state()).await?;

        let playing = match MusicRequest::now_playing(&queue) {
            Some(playing) => playing,
            None => return Ok(Response::new(StatusCode::NoContent)),
        };

        if !req.state().adapter.delete::<MusicRequest>(&playing.id).await {
            return Err(tide::Error::from_str(StatusCode::InternalServerError, "Failed to skip"));
        }

        Ok(Response::builder(StatusCode::Ok)
            .body(Body::from_json(&queue.get(1))?)
            .build())
    }
}
