use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Not logged in".to_string(),
    })
}

#[catch(404)]
pub fn not_found(req: &Request) -> Json<Error> {
    Json(Error {
        message: format!("No route for {}", req.uri().path()),
    })
}

#[catch(422)]
pub fn unprocessable(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Malformed request body".to_string(),
    })
}
