//! Resource access policies.
//!
//! Every check is a pure function of the acting user and the resource, so
//! callers decide what a denial means (403, or 404 to hide existence).

use common::UserId;

use crate::cart::{Cart, CartHeader};
use crate::user::User;
use crate::wishlist::WishlistItem;

/// The authenticated user performing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub is_staff: bool,
}

impl Actor {
    pub fn new(user_id: UserId, is_staff: bool) -> Self {
        Self { user_id, is_staff }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.is_staff)
    }
}

/// Whether a request only reads a resource or changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A resource that belongs to exactly one user.
pub trait Owned {
    fn owner(&self) -> UserId;
}

impl Owned for Cart {
    fn owner(&self) -> UserId {
        self.user_id()
    }
}

impl Owned for CartHeader {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

impl Owned for WishlistItem {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

/// Only the owner may touch the resource.
pub fn is_owner(actor: &Actor, resource: &impl Owned) -> bool {
    resource.owner() == actor.user_id
}

/// The owner has full access; staff may read but never modify.
pub fn is_owner_or_read_only_for_staff(
    actor: &Actor,
    resource: &impl Owned,
    access: Access,
) -> bool {
    is_owner(actor, resource) || (actor.is_staff && access == Access::Read)
}

/// Any authenticated user may read a profile; only its user may change it.
pub fn is_user_or_read_only(actor: &Actor, user_id: UserId, access: Access) -> bool {
    access == Access::Read || actor.user_id == user_id
}

/// Per-user listings are visible to that user and to staff.
pub fn is_self_or_staff(actor: &Actor, user_id: UserId) -> bool {
    actor.is_staff || actor.user_id == user_id
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::cart::CartDetails;

    fn customer() -> Actor {
        Actor::new(UserId::new(), false)
    }

    fn staff() -> Actor {
        Actor::new(UserId::new(), true)
    }

    #[test]
    fn owner_has_full_access() {
        let owner = customer();
        let cart = Cart::open(owner.user_id, CartDetails::default(), Utc::now());

        assert!(is_owner(&owner, &cart));
        assert!(is_owner_or_read_only_for_staff(&owner, &cart, Access::Read));
        assert!(is_owner_or_read_only_for_staff(&owner, &cart, Access::Write));
    }

    #[test]
    fn staff_can_read_but_not_modify_others_carts() {
        let cart = Cart::open(UserId::new(), CartDetails::default(), Utc::now());
        let staff = staff();

        assert!(!is_owner(&staff, &cart));
        assert!(is_owner_or_read_only_for_staff(&staff, &cart, Access::Read));
        assert!(!is_owner_or_read_only_for_staff(&staff, &cart, Access::Write));
    }

    #[test]
    fn strangers_are_denied() {
        let cart = Cart::open(UserId::new(), CartDetails::default(), Utc::now());
        let stranger = customer();

        assert!(!is_owner_or_read_only_for_staff(&stranger, &cart, Access::Read));
        assert!(!is_owner(&stranger, cart.header()));
    }

    #[test]
    fn wishlist_items_are_owned() {
        let owner = customer();
        let item = WishlistItem::new(owner.user_id, common::ProductId::new(), Utc::now());
        assert!(is_owner(&owner, &item));
        assert!(!is_owner(&staff(), &item));
    }

    #[test]
    fn profiles_are_readable_by_anyone_writable_by_self() {
        let me = customer();
        let other = UserId::new();

        assert!(is_user_or_read_only(&me, other, Access::Read));
        assert!(!is_user_or_read_only(&me, other, Access::Write));
        assert!(is_user_or_read_only(&me, me.user_id, Access::Write));
    }

    #[test]
    fn listings_are_self_or_staff() {
        let me = customer();
        assert!(is_self_or_staff(&me, me.user_id));
        assert!(!is_self_or_staff(&me, UserId::new()));
        assert!(is_self_or_staff(&staff(), me.user_id));
    }
}
