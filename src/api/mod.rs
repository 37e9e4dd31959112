use rocket::Route;

mod admin;
mod events;
mod public;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(events::routes());
    routes.extend(public::routes());
    routes.extend(voter::routes());
    routes
}
