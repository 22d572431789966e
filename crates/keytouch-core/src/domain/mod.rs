//! Domain value types for KeyTouch.
//!
//! This module contains pure geometry with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code has no imports from OS APIs,
//! network libraries or UI frameworks, and can be tested on any platform
//! without external setup.
//!
//! Everything the gesture handlers compute is expressed in *normalized*
//! coordinates: a position is a fraction `0.0..=1.0` of the remote frame's
//! width and height.  Only the codec turns those into wire values.

/// Points, sizes and rectangles in pixel or normalized space.
pub mod geometry;
