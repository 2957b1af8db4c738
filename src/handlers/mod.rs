//! HTTP handlers: generic content CRUD, public site endpoints, and the admin area.

pub mod admin;
pub mod entity;
pub mod site;
