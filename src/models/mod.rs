pub mod escrowmodel;
pub mod gigmodel;
pub mod reviewmodel;
