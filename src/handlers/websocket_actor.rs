use std::sync::Arc;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use crate::config::FlowSettings;
use crate::handlers::event_actor::{CheckInActor, Dependencies};
use crate::handlers::events::Command;
use crate::handlers::geolocation::WebSocketGeolocation;
use crate::handlers::handler::{route_inbound, Routed};
use crate::handlers::task::AutoCancelTask;
use crate::models::session::Session;
use crate::models::updates::OutboundMessage;
use crate::models::view::CheckInView;

/// Everything belonging to one connected check-in screen. Dropping it tears
/// the flow down: actor, position source, watches and any in-flight submit.
pub struct CheckInSession {
    user_id: String,
    _actor: AutoCancelTask<()>,
    geolocation: Arc<WebSocketGeolocation>,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<CheckInView>,
    device: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl CheckInSession {
    pub fn new(session: Session,
               settings: FlowSettings,
               geolocation_supported: bool,
               deps: impl FnOnce(Arc<WebSocketGeolocation>) -> Dependencies) -> Self {
        let (device_tx, device) = mpsc::unbounded_channel();
        let geolocation = Arc::new(WebSocketGeolocation::new(geolocation_supported, device_tx));
        let (commands, commands_rx) = mpsc::channel(8);
        let (view_tx, view) = watch::channel(
            CheckInView::new(session.role, session.center.clone(), settings.threshold_m));

        let user_id = session.user_id.clone();
        let actor = CheckInActor::new(session, settings, deps(geolocation.clone()), commands_rx, view_tx);

        Self {
            user_id,
            _actor: AutoCancelTask::spawn(actor.run_actor()),
            geolocation,
            commands,
            view,
            device,
        }
    }

    pub async fn run(self, socket: WebSocket) {
        let Self { user_id, _actor, geolocation, commands, mut view, mut device } = self;
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<OutboundMessage>();

        let inbound_task = AutoCancelTask::spawn(async move {
            while let Some(Ok(msg)) = ws_receiver.next().await {
                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                debug!("Received message: {}", text);
                match route_inbound(&text) {
                    Ok(Routed::Device { id, reply }) => {
                        geolocation.dispatch(id, reply);
                    }
                    Ok(Routed::Command(command)) => {
                        if commands.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Malformed message: {}", e);
                        reply_tx.send(OutboundMessage::Error { message: format!("Malformed message: {}", e) }).ok();
                    }
                }
            }
        });

        let outbound_task = AutoCancelTask::spawn(async move {
            let initial = OutboundMessage::State { view: view.borrow_and_update().clone() };
            if send_json(&mut ws_sender, &initial).await.is_err() {
                return;
            }
            loop {
                let msg = tokio::select! {
                    Some(msg) = device.recv() => msg,
                    Some(msg) = reply_rx.recv() => msg,
                    changed = view.changed() => match changed {
                        Ok(()) => OutboundMessage::State { view: view.borrow_and_update().clone() },
                        Err(_) => break,
                    },
                };
                if send_json(&mut ws_sender, &msg).await.is_err() {
                    return;
                }
            }
            ws_sender.send(Message::Close(None)).await.ok();
        });

        let (mut inbound_task, mut outbound_task) = (inbound_task, outbound_task);
        tokio::select! {
            _ = &mut inbound_task.0 => (),
            _ = &mut outbound_task.0 => (),
        }
        info!("Check-in socket for {} closed", user_id);
    }
}

async fn send_json<S>(sender: &mut S, msg: &OutboundMessage) -> Result<(), ()>
    where S: futures_util::Sink<Message> + Unpin {
    let text = serde_json::to_string(msg).map_err(|e| warn!("Unserializable message: {}", e))?;
    sender.send(Message::Text(text)).await.map_err(|_| debug!("Socket closed while sending"))
}
