//! Queue service operations: draining and deleting messages.

use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::auth::SharedKey;
use crate::error::AzureStorageError;
use crate::transport::StorageTransport;
use crate::StorageCredentials;

/// One message retrieved from a queue. The pop receipt matches this
/// specific delivery; deleting with a stale receipt fails and the
/// message becomes visible again for redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub pop_receipt: String,
    pub text: String,
}

/// Queue-service client for a single storage account.
pub struct QueueClient {
    transport: StorageTransport,
}

impl QueueClient {
    pub fn new(credentials: &StorageCredentials) -> Result<Self, AzureStorageError> {
        let endpoint = format!("https://{}.queue.core.windows.net", credentials.account);
        Self::with_endpoint(credentials, &endpoint)
    }

    /// Build a client against a custom endpoint (Azurite, test servers).
    pub fn with_endpoint(
        credentials: &StorageCredentials,
        endpoint: &str,
    ) -> Result<Self, AzureStorageError> {
        let key = SharedKey::new(&credentials.account, &credentials.access_key)?;
        Ok(Self {
            transport: StorageTransport::new(endpoint, key)?,
        })
    }

    /// Retrieve up to `max_messages` messages, hiding each retrieved
    /// message from other consumers for `visibility_timeout_secs`.
    pub async fn get_messages(
        &self,
        queue: &str,
        visibility_timeout_secs: u32,
        max_messages: u32,
    ) -> Result<Vec<QueueMessage>, AzureStorageError> {
        let path = format!("{queue}/messages");
        let query = [
            ("numofmessages", max_messages.to_string()),
            ("visibilitytimeout", visibility_timeout_secs.to_string()),
        ];
        let response = self.transport.send(Method::GET, &path, &query, &[]).await?;
        let body = response.text().await?;
        let parsed: QueueMessagesList = quick_xml::de::from_str(&body).map_err(|err| {
            AzureStorageError::InvalidResponse(format!("malformed queue listing: {err}"))
        })?;
        let messages: Vec<QueueMessage> = parsed
            .messages
            .into_iter()
            .map(|message| QueueMessage {
                id: message.message_id,
                pop_receipt: message.pop_receipt,
                text: message.message_text,
            })
            .collect();
        debug!(
            account = self.transport.account(),
            queue,
            count = messages.len(),
            "retrieved queue messages"
        );
        Ok(messages)
    }

    /// Delete a message, proving this delivery with its pop receipt.
    pub async fn delete_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> Result<(), AzureStorageError> {
        let path = format!("{queue}/messages/{message_id}");
        let query = [("popreceipt", pop_receipt.to_string())];
        self.transport
            .send(Method::DELETE, &path, &query, &[])
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QueueMessagesList {
    #[serde(rename = "QueueMessage", default)]
    messages: Vec<QueueMessageXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueMessageXml {
    message_id: String,
    pop_receipt: String,
    #[serde(default)]
    message_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use mockito::Matcher;

    fn test_client(server: &mockito::ServerGuard) -> QueueClient {
        let credentials = StorageCredentials {
            account: "testaccount".to_string(),
            access_key: BASE64.encode(b"secret"),
        };
        QueueClient::with_endpoint(&credentials, &server.url()).unwrap()
    }

    const MESSAGES_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<QueueMessagesList>
  <QueueMessage>
    <MessageId>msg-1</MessageId>
    <InsertionTime>Thu, 17 Aug 2017 18:03:27 GMT</InsertionTime>
    <ExpirationTime>Thu, 24 Aug 2017 18:03:27 GMT</ExpirationTime>
    <PopReceipt>receipt-1</PopReceipt>
    <TimeNextVisible>Thu, 17 Aug 2017 18:04:27 GMT</TimeNextVisible>
    <DequeueCount>1</DequeueCount>
    <MessageText>eyJDb250YWluZXIiOiAiYyIsICJOYW1lIjogImIifQ==</MessageText>
  </QueueMessage>
  <QueueMessage>
    <MessageId>msg-2</MessageId>
    <PopReceipt>receipt-2</PopReceipt>
    <MessageText>second</MessageText>
  </QueueMessage>
</QueueMessagesList>"#;

    #[tokio::test]
    async fn get_messages_parses_ids_receipts_and_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/workqueue/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("numofmessages".into(), "32".into()),
                Matcher::UrlEncoded("visibilitytimeout".into(), "60".into()),
            ]))
            .with_status(200)
            .with_body(MESSAGES_XML)
            .create_async()
            .await;

        let client = test_client(&server);
        let messages = client.get_messages("workqueue", 60, 32).await.unwrap();

        mock.assert_async().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "msg-1");
        assert_eq!(messages[0].pop_receipt, "receipt-1");
        assert_eq!(
            messages[0].text,
            "eyJDb250YWluZXIiOiAiYyIsICJOYW1lIjogImIifQ=="
        );
        assert_eq!(messages[1].id, "msg-2");
    }

    #[tokio::test]
    async fn get_messages_handles_an_empty_queue() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/workqueue/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"<?xml version="1.0" encoding="utf-8"?><QueueMessagesList />"#)
            .create_async()
            .await;

        let client = test_client(&server);
        let messages = client.get_messages("workqueue", 60, 32).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn delete_message_passes_the_pop_receipt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/workqueue/messages/msg-1")
            .match_query(Matcher::UrlEncoded(
                "popreceipt".into(),
                "receipt+1=".into(),
            ))
            .with_status(204)
            .create_async()
            .await;

        let client = test_client(&server);
        client
            .delete_message("workqueue", "msg-1", "receipt+1=")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn stale_pop_receipt_is_classified_as_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/workqueue/messages/msg-1")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = test_client(&server);
        let err = client
            .delete_message("workqueue", "msg-1", "stale")
            .await
            .unwrap_err();
        assert!(matches!(err, AzureStorageError::NotFound));
    }
}
