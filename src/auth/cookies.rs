/// Session cookie transport
///
/// Both tokens travel in http-only, SameSite=Lax cookies whose max-age
/// matches the token lifetime. The secure flag follows configuration.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use chrono::Duration;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

#[derive(Debug, Clone, Copy, Default)]
pub struct CookieSettings {
    pub secure: bool,
}

impl CookieSettings {
    pub fn access_cookie(&self, token: &str, lifetime: Duration) -> Cookie<'static> {
        self.build(ACCESS_TOKEN_COOKIE, token.to_string(), lifetime)
    }

    pub fn refresh_cookie(&self, token: &str, lifetime: Duration) -> Cookie<'static> {
        self.build(REFRESH_TOKEN_COOKIE, token.to_string(), lifetime)
    }

    /// Expired, empty cookies that make the browser drop both tokens.
    pub fn removal_cookies(&self) -> [Cookie<'static>; 2] {
        [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE].map(|name| {
            let mut cookie = self.build(name, String::new(), Duration::zero());
            cookie.make_removal();
            cookie
        })
    }

    fn build(&self, name: &'static str, value: String, lifetime: Duration) -> Cookie<'static> {
        Cookie::build(name, value)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(CookieDuration::seconds(lifetime.num_seconds()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_cookie_attributes() {
        let cookie = CookieSettings { secure: false }.access_cookie("abc", Duration::minutes(10));

        assert_eq!(cookie.name(), "access_token");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(600)));
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = CookieSettings { secure: true }.refresh_cookie("xyz", Duration::days(7));

        assert_eq!(cookie.name(), "refresh_token");
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(604_800)));
    }

    #[test]
    fn test_removal_cookies_clear_both_tokens() {
        let [access, refresh] = CookieSettings::default().removal_cookies();

        assert_eq!(access.name(), "access_token");
        assert_eq!(refresh.name(), "refresh_token");
        assert_eq!(access.value(), "");
        assert_eq!(access.max_age(), Some(CookieDuration::ZERO));
    }
}
