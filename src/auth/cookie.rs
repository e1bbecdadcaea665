//! Session cookie attributes.
//!
//! The token travels only in an http-only, same-site-strict cookie; clearing
//! it must repeat the name and path or browsers keep the old one.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::config::CookieConfig;

pub fn session_cookie(cfg: &CookieConfig, token: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((cfg.name.clone(), token))
        .http_only(true)
        .secure(cfg.secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(max_age)
        .build()
}

pub fn clear_session(jar: CookieJar, cfg: &CookieConfig) -> CookieJar {
    jar.remove(Cookie::build((cfg.name.clone(), "")).path("/"))
}

pub fn session_token<'a>(jar: &'a CookieJar, cfg: &CookieConfig) -> Option<&'a str> {
    jar.get(&cfg.name)
        .map(|c| c.value())
        .filter(|v| !v.is_empty())
}
