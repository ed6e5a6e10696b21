//! Effective permission computation from base role permissions and channel overrides.

use super::overrides::PermissionOverride;
use super::types::{Permissions, FULL_MASK};

/// Compute the effective permission mask.
///
/// Administrators get [`FULL_MASK`] regardless of overrides. Otherwise role
/// overrides are applied as a union (deny first, then allow, so a role allow beats
/// another role's deny) and a member override is applied last with the same
/// deny-then-allow order.
pub fn resolve<'a, I>(
    base_role_permissions: u64,
    role_overrides: I,
    member_override: Option<&PermissionOverride>,
) -> u64
where
    I: IntoIterator<Item = &'a PermissionOverride>,
{
    if base_role_permissions & Permissions::ADMINISTRATOR.bits() != 0 {
        return FULL_MASK;
    }

    let (role_allow, role_deny) = role_overrides
        .into_iter()
        .fold((0u64, 0u64), |(allow, deny), o| {
            (allow | o.allowed_raw(), deny | o.denied_raw())
        });

    let mut effective = (base_role_permissions & !role_deny) | role_allow;

    if let Some(member) = member_override {
        effective = (effective & !member.denied_raw()) | member.allowed_raw();
    }

    effective
}

/// True when every bit of `required` is present in `effective`
pub fn has_all(effective: u64, required: Permissions) -> bool {
    effective & required.bits() == required.bits()
}
