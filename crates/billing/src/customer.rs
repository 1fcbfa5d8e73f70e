//! Customer linkage and Stripe customer management
//!
//! The only local customer state is the email → Stripe customer id mapping in
//! the `customers` table. It decides whether a checkout creates a new Stripe
//! customer or reuses the existing one.

use sqlx::PgPool;
use stripe::{CreateCustomer, Customer, CustomerId, CustomerInvoiceSettings, PaymentMethodId};
use time::OffsetDateTime;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// A row of the `customers` table
#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow)]
pub struct CustomerLink {
    pub id: i64,
    pub email: String,
    pub customer_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Repository over the `customers` table
#[derive(Clone)]
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> BillingResult<Option<CustomerLink>> {
        let link = sqlx::query_as::<_, CustomerLink>(
            "SELECT id, email, customer_id, created_at FROM customers WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(link)
    }

    /// Link `email` to `customer_id`
    ///
    /// If the email is already linked the existing row wins and is returned.
    pub async fn insert(&self, email: &str, customer_id: &str) -> BillingResult<CustomerLink> {
        let inserted = sqlx::query_as::<_, CustomerLink>(
            r#"
            INSERT INTO customers (email, customer_id)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, customer_id, created_at
            "#,
        )
        .bind(email)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(link) = inserted {
            return Ok(link);
        }

        let existing = self.find_by_email(email).await?.ok_or_else(|| {
            BillingError::Internal(format!("customer link for {} vanished after conflict", email))
        })?;

        if existing.customer_id != customer_id {
            tracing::warn!(
                email = %email,
                existing_customer_id = %existing.customer_id,
                ignored_customer_id = %customer_id,
                "Email already linked to a different Stripe customer"
            );
        }

        Ok(existing)
    }
}

pub struct CustomerService {
    stripe: StripeClient,
    repo: CustomerRepository,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            stripe,
            repo: CustomerRepository::new(pool),
        }
    }

    /// Reuse the Stripe customer linked to `email`, or create one
    ///
    /// A new customer gets `payment_method` attached and set as the default
    /// for invoices, then the link is stored.
    pub async fn get_or_create(
        &self,
        email: &str,
        payment_method: &str,
    ) -> BillingResult<Customer> {
        if let Some(link) = self.repo.find_by_email(email).await? {
            let customer_id = link
                .customer_id
                .parse::<CustomerId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

            let customer = Customer::retrieve(self.stripe.inner(), &customer_id, &[]).await?;

            tracing::info!(
                email = %email,
                customer_id = %customer.id,
                "Retrieved existing Stripe customer"
            );
            return Ok(customer);
        }

        let payment_method_id = payment_method
            .parse::<PaymentMethodId>()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid payment method: {}", e)))?;

        let params = CreateCustomer {
            email: Some(email),
            payment_method: Some(payment_method_id),
            invoice_settings: Some(CustomerInvoiceSettings {
                default_payment_method: Some(payment_method.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params).await?;
        self.repo.insert(email, customer.id.as_str()).await?;

        tracing::info!(
            email = %email,
            customer_id = %customer.id,
            "Created new Stripe customer"
        );

        Ok(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a migrated Postgres database at DATABASE_URL
    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_insert_keeps_first_link() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        let repo = CustomerRepository::new(pool);
        let email = format!(
            "test-{}@example.com",
            OffsetDateTime::now_utc().unix_timestamp_nanos()
        );

        assert!(repo.find_by_email(&email).await.unwrap().is_none());

        let first = repo.insert(&email, "cus_first").await.unwrap();
        let second = repo.insert(&email, "cus_second").await.unwrap();

        assert_eq!(first.customer_id, "cus_first");
        assert_eq!(second, first);
        assert_eq!(
            repo.find_by_email(&email).await.unwrap().unwrap().customer_id,
            "cus_first"
        );
    }
}
