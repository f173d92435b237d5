use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub allow_duplicates: bool,
    pub solicited_service_uuids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub notify_on_connection: bool,
    pub notify_on_disconnection: bool,
    pub notify_on_notification: bool,
}
