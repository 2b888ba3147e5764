//! # OrderPay server
//! A thin HTTP front end for the OrderPay engine. Handlers parse the request, call the engine and format the result
//! as `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`. All lifecycle rules live in the
//! engine.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /orders`, `GET /orders/{id}`, `GET /orders/{id}/history`
//! * `POST /orders/{id}/cancel`, `POST /orders/{id}/ship`, `POST /orders/{id}/deliver`
//! * `GET /users/{user_id}/orders`, `GET /users/{user_id}/order_stats`
//! * `POST /payments`, `GET /payments/{id}`, `POST /payments/{id}/confirm`, `POST /payments/{id}/cancel`
//! * `GET /users/{user_id}/payments`
//! * `POST /refunds`, `GET /refunds/{id}`, `POST /refunds/{id}/cancel`
//! * `GET /users/{user_id}/refunds`, `GET /users/{user_id}/refund_stats`
//! * `POST /webhook`: Asynchronous gateway events, signed in the `X-Gateway-Signature` header.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod gateway_client;
pub mod maintenance_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
