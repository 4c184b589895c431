use cryptonote_listener::{
    storage::{stores::InMemory, Storage},
    PaymentGateway,
};

/// Shared by every request handler.
pub(crate) struct State<S: Storage = InMemory> {
    pub(crate) payment_gateway: PaymentGateway<S>,
}

impl<S: Storage> State<S> {
    pub(crate) fn new(payment_gateway: PaymentGateway<S>) -> Self {
        Self { payment_gateway }
    }
}

impl<S: Storage> Clone for State<S> {
    fn clone(&self) -> Self {
        Self {
            payment_gateway: self.payment_gateway.clone(),
        }
    }
}
