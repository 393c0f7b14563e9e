// handlers/mod.rs - HTTP handlers
//
// Entity controllers are mounted once per platform (admin, client, device);
// the platforms share handlers and differ only in their route prefix.

pub mod entity;
