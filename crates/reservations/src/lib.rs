//! Reservation domain module.
//!
//! A reservation is a time-bounded claim on stock for one key. Expiry is a
//! pure function of "now" against the stored deadline: an ACTIVE reservation
//! past its deadline is treated as expired by every decision and by
//! [`Availability::compute`], whether or not a sweep has persisted the
//! transition yet.

pub mod availability;
pub mod reservation;

pub use availability::Availability;
pub use reservation::{
    CancelReservation, CommitReservation, ExpireReservation, PlaceReservation, Reservation,
    ReservationCancelled, ReservationCommand, ReservationCommitted, ReservationEvent,
    ReservationExpired, ReservationId, ReservationPlaced, ReservationStatus,
};
