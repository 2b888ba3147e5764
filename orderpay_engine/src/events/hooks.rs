use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::{
    db_types::{Authorization, Order, OrderStatusType, Refund},
    events::{EventHandler, EventProducer, Handler, OrderAnnulledEvent, OrderPaidEvent, RefundSettledEvent},
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
    pub refund_settled_producer: Vec<EventProducer<RefundSettledEvent>>,
}

impl EventProducers {
    /// Notifies subscribers about an order that has just changed status. Only `Paid` and the annulled statuses
    /// (`Cancelled`, `Failed`, `Refunded`) have hooks.
    pub async fn publish_order_change(&self, order: &Order, authorization: Option<&Authorization>) {
        match (order.status, authorization) {
            (OrderStatusType::Paid, Some(auth)) => {
                for emitter in &self.order_paid_producer {
                    debug!("🔄️📦️ Notifying order paid hook subscribers");
                    emitter.publish_event(OrderPaidEvent::new(order.clone(), auth.clone())).await;
                }
            },
            (OrderStatusType::Cancelled | OrderStatusType::Failed | OrderStatusType::Refunded, _) => {
                for emitter in &self.order_annulled_producer {
                    debug!("🔄️📦️ Notifying order annulled hook subscribers");
                    emitter.publish_event(OrderAnnulledEvent::new(order.clone())).await;
                }
            },
            _ => {},
        }
    }

    pub async fn publish_refund_settled(&self, refund: &Refund) {
        if !refund.status.is_terminal() {
            return;
        }
        for emitter in &self.refund_settled_producer {
            debug!("🔄️💸️ Notifying refund settled hook subscribers");
            emitter.publish_event(RefundSettledEvent::new(refund.clone())).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_refund_settled: Option<EventHandler<RefundSettledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_order_annulled = hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_settled = hooks.on_refund_settled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_order_annulled, on_refund_settled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_settled {
            result.refund_settled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_refund_settled {
            tokio::spawn(handler.start_handler());
        }
    }
}

type BoxedHook = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_refund_settled: Option<Handler<RefundSettledEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_refund_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundSettledEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_refund_settled = Some(Arc::new(f));
        self
    }
}
