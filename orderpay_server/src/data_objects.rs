use std::collections::BTreeMap;

use orderpay_common::MinorUnits;
use orderpay_engine::db_types::{Authorization, OrderId, Pagination, UserRole};
use serde::{Deserialize, Serialize};

/// The envelope for every successful response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub amount: MinorUnits,
    pub currency: String,
}

/// Order mutations carry the version the caller last saw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VersionParams {
    pub expected_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentRequest {
    pub order_id: OrderId,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// The client secret is only ever returned here, to the caller that created the payment.
#[derive(Debug, Clone, Serialize)]
pub struct NewPaymentResponse {
    #[serde(flatten)]
    pub authorization: Authorization,
    pub client_secret: Option<String>,
}

impl From<Authorization> for NewPaymentResponse {
    fn from(authorization: Authorization) -> Self {
        let client_secret = authorization.client_secret.clone();
        Self { authorization, client_secret }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRefundRequest {
    pub authorization_id: String,
    /// Refunds the remaining refundable amount when omitted
    pub amount: Option<MinorUnits>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageParams> for Pagination {
    fn from(params: PageParams) -> Self {
        let default = Pagination::default();
        Pagination::new(params.page.unwrap_or(default.page), params.limit.unwrap_or(default.limit))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrderListParams {
    /// Lists the orders where the user is buyer or seller. Defaults to buyer.
    pub role: Option<UserRole>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl OrderListParams {
    pub fn role(&self) -> UserRole {
        self.role.unwrap_or(UserRole::Buyer)
    }

    pub fn pagination(&self) -> Pagination {
        PageParams { page: self.page, limit: self.limit }.into()
    }
}
