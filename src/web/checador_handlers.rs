// src/web/checador_handlers.rs
use crate::{
    error::{AppError, AppResult},
    fingerprint::simulated::sample_for,
    models::alumno::parse_matricula,
    services::alumno_service,
    state::AppState,
    templates::{render, ChecadorPage},
    web::mw_auth::CurrentUser,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use uuid::Uuid;

/// Ação enviada pela página do checador.
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChecadorAction {
    /// Entrada manual da matrícula
    Manual { matricula: String },
    /// Coloca no leitor simulado o dedo do aluno indicado
    Simular { matricula: String },
}

// Aviso só para a ligação que fez o pedido
#[derive(Serialize, Debug)]
struct Notice<'a> {
    state: &'static str,
    message: &'a str,
}

fn notice_json(message: &str) -> Option<String> {
    serde_json::to_string(&Notice { state: "notice", message }).ok()
}

// GET /checador
pub async fn checador_page(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<impl IntoResponse> {
    render(&ChecadorPage {
        nav: user.nav(),
        simulator: state.simulator.is_some(),
        record_type: state.station.settings().record_type.clone(),
    })
}

// GET /checador/ws
pub async fn checador_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> impl IntoResponse {
    tracing::info!("Tentativa de upgrade WebSocket do checador por {}", user.username);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user.username))
}

async fn handle_socket(socket: WebSocket, state: AppState, operator: String) {
    let conn_id = Uuid::new_v4();
    tracing::info!("🔌 Nova conexão WS Checador: {} (Operador: {})", conn_id, operator);

    // Enquanto o guard existir o ciclo de escuta continua ativo
    let (guard, mut events) = state.station.attach();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(32);

    // Estado atual logo ao ligar
    if let Ok(text) = serde_json::to_string(&state.station.current_state()) {
        let _ = tx.send(text).await;
    }

    // --- Task 1: eventos da estação -> canal ---
    let station = state.station.clone();
    let tx_events = tx.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                // Perdeu eventos: reenvia só o estado atual
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("WS Checador {} atrasado ({} eventos).", conn_id, skipped);
                    station.current_state()
                }
                Err(RecvError::Closed) => break,
            };
            let Ok(text) = serde_json::to_string(&event) else { continue };
            if tx_events.send(text).await.is_err() {
                break;
            }
        }
    });

    // --- Task 2: canal -> cliente ---
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                tracing::warn!("Falha ao enviar msg WS para {}, terminando send_task.", conn_id);
                break;
            }
        }
    });

    // --- Task 3: ações do cliente ---
    let state_recv = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!("<- WS Checador Recebido de {}: {}", conn_id, text.as_str());
                    let reply = match serde_json::from_str::<ChecadorAction>(text.as_str()) {
                        Ok(action) => process_action(&state_recv, action).await,
                        Err(e) => {
                            tracing::warn!("Mensagem WS Checador inválida: {}, Erro: {}", text.as_str(), e);
                            None
                        }
                    };
                    if let Some(text) = reply.as_deref().and_then(notice_json) {
                        if tx.send(text).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::info!("Cliente {} enviou Close frame.", conn_id);
                    break;
                }
                _ => tracing::trace!("Ignorando msg WS não-texto de {}", conn_id),
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    forward_task.abort();

    drop(guard);
    tracing::info!("🔌 Conexão WS Checador {} fechada.", conn_id);
}

/// Executa uma ação do cliente. Devolve um aviso para mostrar só nessa página;
/// os resultados de registo chegam a todas as páginas pelo canal da estação.
async fn process_action(state: &AppState, action: ChecadorAction) -> Option<String> {
    match action {
        ChecadorAction::Manual { matricula } => match state.station.submit_manual(&matricula).await {
            Ok(_) => None,
            Err(err) => {
                if !matches!(err, AppError::Validation(_)) {
                    tracing::error!("Checador: entrada manual falhou: {:?}", err);
                }
                Some(err.user_message())
            }
        },
        ChecadorAction::Simular { matricula } => match simulate_finger(state, &matricula).await {
            Ok(message) => Some(message),
            Err(err) => Some(err.user_message()),
        },
    }
}

async fn simulate_finger(state: &AppState, raw: &str) -> AppResult<String> {
    let Some(reader) = &state.simulator else {
        return Err(AppError::Validation("El lector simulado no está activo.".to_string()));
    };
    let matricula = parse_matricula(raw)?;

    // Com huella registada usa a plantilla gravada; sem ela, uma amostra desconhecida
    let sample = match alumno_service::find_alumno_by_matricula(&state.db_pool, matricula).await? {
        Some(alumno) => alumno.fingerprint.filter(|t| !t.is_empty()),
        None => None,
    }
    .unwrap_or_else(|| sample_for(matricula));

    reader.place_finger(sample);
    Ok(format!("Dedo simulado de la matrícula {} colocado en el lector.", matricula))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        checkin::station::StationState,
        services::alumno_service::{create_alumno, sample_input},
        state::test_state,
    };

    #[test]
    fn client_actions_are_tagged_by_name() {
        let action: ChecadorAction = serde_json::from_str(r#"{"action":"manual","matricula":"1001"}"#).unwrap();
        assert!(matches!(action, ChecadorAction::Manual { ref matricula } if matricula == "1001"));
        assert!(serde_json::from_str::<ChecadorAction>(r#"{"action":"borrar"}"#).is_err());
    }

    #[tokio::test]
    async fn malformed_manual_entry_only_notifies_the_sender() {
        let state = test_state().await;
        let reply = process_action(&state, ChecadorAction::Manual { matricula: "abc".into() }).await;
        assert_eq!(reply.as_deref(), Some("La matrícula debe ser un número entero positivo."));
        assert_eq!(state.station.current_state(), StationState::Idle);
    }

    #[tokio::test]
    async fn manual_entry_resolves_the_station() {
        let state = test_state().await;
        create_alumno(&state.db_pool, &sample_input("1001", "Lucía")).await.unwrap();

        let reply = process_action(&state, ChecadorAction::Manual { matricula: "1001".into() }).await;
        assert!(reply.is_none());
        match state.station.current_state() {
            StationState::Resolved { result } => assert!(result.success),
            other => panic!("estado inesperado: {:?}", other),
        }
    }

    #[tokio::test]
    async fn simulated_finger_uses_the_stored_template() {
        let state = test_state().await;
        let id = create_alumno(&state.db_pool, &sample_input("1001", "Lucía")).await.unwrap();
        alumno_service::set_fingerprint(&state.db_pool, id, Some(&[7u8; 16][..])).await.unwrap();

        let reply = process_action(&state, ChecadorAction::Simular { matricula: "1001".into() }).await;
        assert!(reply.unwrap_or_default().contains("1001"));
        let reader = state.simulator.as_ref().unwrap();
        assert_eq!(reader.pending(), 1);
    }
}
