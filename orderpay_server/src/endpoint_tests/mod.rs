mod helpers;
mod orders;
mod payments;
mod webhooks;
