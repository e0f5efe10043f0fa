//! Transcoding and delivery core for a self-hosted media library.
//!
//! The daemon walks a media directory for sources, transcodes each one to
//! HLS with ffmpeg, resumes interrupted encodes from the segments that
//! survived, and announces finished titles to the application server. Two
//! caches serve delivery paths that plain HLS cannot: whole-title MP4
//! downloads and live fMP4 remuxing for players without MPEG-TS support.

pub mod config;
pub mod encoder;
pub mod error;
pub mod inventory;
pub mod layout;
pub mod mediapath;
pub mod notifications;
pub mod remux;
pub mod template;
