use rocket::{
    response::stream::{Event as StreamEvent, EventStream},
    serde::json::Json,
    tokio::{select, sync::broadcast::error::RecvError},
    Route, Shutdown, State,
};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    api::ledger::{LedgerExport, PublicRecord},
    auth::AuthToken,
    event::EventKind,
    ledger::Ledger,
    pagination::{Paginated, Pagination},
};

pub fn routes() -> Vec<Route> {
    routes![events, event_stream, export]
}

/// Recorded events, oldest first, optionally only those of one kind.
#[get("/events?<kind>")]
async fn events(
    kind: Option<EventKind>,
    pagination: Pagination,
    ledger: &State<Ledger>,
) -> Result<Json<Paginated<PublicRecord>>> {
    let (_, records) = ledger.export().await?;
    let records = records
        .into_iter()
        .filter(|record| kind.map_or(true, |kind| record.event.kind() == kind))
        .map(PublicRecord::from)
        .collect();
    Ok(Json(pagination.paginate(records)))
}

/// Every record committed after the subscription starts, as server-sent events.
#[get("/events/stream")]
fn event_stream(
    id: RequestId,
    ledger: &State<Ledger>,
    mut shutdown: Shutdown,
) -> EventStream![] {
    let mut committed = ledger.subscribe();
    info!("req{id} subscribed to the event stream");
    EventStream! {
        loop {
            let record = select! {
                received = committed.recv() => match received {
                    Ok(record) => PublicRecord::from(record),
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(missed)) => {
                        warn!("req{id} missed {missed} events");
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            };
            yield StreamEvent::json(&record).event(record.event.kind().to_string());
        }
    }
}

/// The complete log, for independent verification and replay.
#[get("/ledger/export")]
async fn export(token: AuthToken, ledger: &State<Ledger>) -> Result<Json<LedgerExport>> {
    ledger.context(token.caller()).require_administrator()?;
    let (head, events) = ledger.export().await?;
    Ok(Json(LedgerExport { head, events }))
}
