//! Role → route table and the post-login destination rule.
//!
//! Sign-in, sign-up and the route guard all steer users through this module;
//! nothing else hard-codes a role's landing page.

use crate::models::UserRole;

pub const HOME:      &str = "/";
pub const LOGIN:     &str = "/login";
pub const FORBIDDEN: &str = "/403";
pub const EXPLORE:   &str = "/explore";

pub const GUEST_REGISTER:      &str = "/guest/register";
pub const ADMIN_PRE_REGISTER:  &str = "/admin/pre-register";
pub const VENDOR_PRE_REGISTER: &str = "/vendor/pre-register";

const VENDOR_SERVICES: &str = "/vendor/services";

/// Landing page for a role; users without a role go home.
pub fn role_home(role: Option<UserRole>) -> &'static str {
    match role {
        Some(UserRole::Guest)  => EXPLORE,
        Some(UserRole::Admin)  => "/admin/dashboard",
        Some(UserRole::Vendor) => "/vendor/dashboard",
        None                   => HOME,
    }
}

/// Segment-aware prefix test: `/admin` matches `/admin` and `/admin/x`,
/// never `/administrator`.
pub fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// Where a freshly authenticated user goes next.
///
/// A vendor who was bounced to the login page from the vendor-services area
/// returns there; everyone else lands on their role's home.
pub fn post_login_destination(role: Option<UserRole>, redirected_from: Option<&str>) -> String {
    if role == Some(UserRole::Vendor) {
        if let Some(path) = redirected_from.filter(|p| is_under(p, VENDOR_SERVICES)) {
            return path.to_owned();
        }
    }
    role_home(role).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_home() {
        assert_eq!(role_home(Some(UserRole::Guest)), "/explore");
        assert_eq!(role_home(Some(UserRole::Admin)), "/admin/dashboard");
        assert_eq!(role_home(Some(UserRole::Vendor)), "/vendor/dashboard");
        assert_eq!(role_home(None), "/");
    }

    #[test]
    fn prefix_matching_respects_segments() {
        assert!(is_under("/admin", "/admin"));
        assert!(is_under("/admin/bookings", "/admin"));
        assert!(!is_under("/administrator", "/admin"));
        assert!(!is_under("/vendor", "/admin"));
    }

    #[test]
    fn vendor_services_redirect_only_honored_for_vendors() {
        let from = Some("/vendor/services/new");
        assert_eq!(post_login_destination(Some(UserRole::Vendor), from), "/vendor/services/new");
        assert_eq!(post_login_destination(Some(UserRole::Guest), from), "/explore");
        assert_eq!(post_login_destination(Some(UserRole::Admin), from), "/admin/dashboard");
    }

    #[test]
    fn unrelated_redirect_hints_fall_back_to_role_home() {
        assert_eq!(
            post_login_destination(Some(UserRole::Vendor), Some("/profile")),
            "/vendor/dashboard"
        );
        assert_eq!(post_login_destination(Some(UserRole::Vendor), None), "/vendor/dashboard");
    }
}
