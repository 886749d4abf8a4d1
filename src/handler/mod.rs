pub mod gig;
