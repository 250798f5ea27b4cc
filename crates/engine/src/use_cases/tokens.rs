//! Token placement and visibility.

use async_trait::async_trait;
use serde::Deserialize;

use tablekeep_domain::{ActionRequest, Position, SessionState, Token, TokenId};

use crate::registry::{ActionHandler, ExecuteError, ValidationError};
use crate::use_cases::{codes, require_control};

pub const MOVE_TOKEN: &str = "move-token";
pub const SET_TOKEN_VISIBILITY: &str = "set-token-visibility";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveTokenParams {
    token_id: TokenId,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetTokenVisibilityParams {
    token_id: TokenId,
    hidden: bool,
}

fn existing_token(state: &SessionState, id: TokenId) -> Result<&Token, ValidationError> {
    state.token(id).ok_or_else(|| {
        ValidationError::new(codes::TOKEN_NOT_FOUND, format!("Token {id} does not exist"))
    })
}

fn token_mut(draft: &mut SessionState, id: TokenId) -> Result<&mut Token, ExecuteError> {
    draft
        .token_mut(id)
        .ok_or_else(|| tablekeep_domain::DomainError::not_found("Token", id.to_string()).into())
}

/// `move-token {tokenId, x, y}`; owners move their own tokens.
pub struct MoveToken;

#[async_trait]
impl ActionHandler for MoveToken {
    async fn validate(
        &self,
        request: &ActionRequest,
        state: &SessionState,
    ) -> Result<(), ValidationError> {
        let params: MoveTokenParams = request.params()?;
        if !params.x.is_finite() || !params.y.is_finite() {
            return Err(ValidationError::new(
                codes::INVALID_POSITION,
                "Token coordinates must be finite numbers",
            ));
        }
        let token = existing_token(state, params.token_id)?;
        require_control(state, token.document_id, &request.submitter)
    }

    async fn execute(
        &self,
        request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        let params: MoveTokenParams = request.params()?;
        token_mut(draft, params.token_id)?.position = Position {
            x: params.x,
            y: params.y,
        };
        Ok(())
    }
}

/// `set-token-visibility {tokenId, hidden}` (leader only)
pub struct SetTokenVisibility;

#[async_trait]
impl ActionHandler for SetTokenVisibility {
    fn restricted_to_leader(&self) -> bool {
        true
    }

    async fn validate(
        &self,
        request: &ActionRequest,
        state: &SessionState,
    ) -> Result<(), ValidationError> {
        let params: SetTokenVisibilityParams = request.params()?;
        existing_token(state, params.token_id).map(|_| ())
    }

    async fn execute(
        &self,
        request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        let params: SetTokenVisibilityParams = request.params()?;
        token_mut(draft, params.token_id)?.hidden = params.hidden;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::request;
    use serde_json::json;
    use tablekeep_domain::{Document, ParticipantId, SessionId, Submitter};

    struct Table {
        state: SessionState,
        owner: ParticipantId,
        token: TokenId,
    }

    fn table() -> Table {
        let owner = ParticipantId::new();
        let rogue = Document::new("character", "Rogue").with_owner(owner);
        let token = Token::new(rogue.id, Position { x: 1.0, y: 2.0 });
        let token_id = token.id;
        Table {
            state: SessionState::new(SessionId::new())
                .with_document(rogue)
                .with_token(token),
            owner,
            token: token_id,
        }
    }

    #[tokio::test]
    async fn owner_moves_own_token() {
        let t = table();
        let req = request(
            MOVE_TOKEN,
            Submitter::player(t.owner),
            json!({ "tokenId": t.token, "x": 4.5, "y": -3.0 }),
        );

        MoveToken.validate(&req, &t.state).await.expect("valid");
        let mut draft = t.state.clone();
        MoveToken.execute(&req, &mut draft).await.expect("execute");

        let moved = draft.token(t.token).expect("token");
        assert_eq!(moved.position, Position { x: 4.5, y: -3.0 });
    }

    #[tokio::test]
    async fn other_players_cannot_move_it() {
        let t = table();
        let req = request(
            MOVE_TOKEN,
            Submitter::player(ParticipantId::new()),
            json!({ "tokenId": t.token, "x": 0.0, "y": 0.0 }),
        );

        let err = MoveToken.validate(&req, &t.state).await.expect_err("not owner");
        assert_eq!(err.code, codes::NOT_DOCUMENT_OWNER);
    }

    #[tokio::test]
    async fn leader_moves_any_token() {
        let t = table();
        let req = request(
            MOVE_TOKEN,
            Submitter::leader(ParticipantId::new()),
            json!({ "tokenId": t.token, "x": 9.0, "y": 9.0 }),
        );
        MoveToken.validate(&req, &t.state).await.expect("leader allowed");
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let t = table();
        let req = request(
            MOVE_TOKEN,
            Submitter::leader(ParticipantId::new()),
            json!({ "tokenId": TokenId::new(), "x": 0.0, "y": 0.0 }),
        );
        let err = MoveToken.validate(&req, &t.state).await.expect_err("missing");
        assert_eq!(err.code, codes::TOKEN_NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_parameters_are_invalid() {
        let t = table();
        let req = request(
            MOVE_TOKEN,
            Submitter::leader(ParticipantId::new()),
            json!({ "tokenId": t.token, "x": "left" }),
        );
        let err = MoveToken.validate(&req, &t.state).await.expect_err("bad params");
        assert_eq!(err.code, tablekeep_shared::rejection_codes::INVALID_PARAMETERS);
    }

    #[tokio::test]
    async fn visibility_toggles() {
        let t = table();
        assert!(SetTokenVisibility.restricted_to_leader());

        let req = request(
            SET_TOKEN_VISIBILITY,
            Submitter::leader(ParticipantId::new()),
            json!({ "tokenId": t.token, "hidden": true }),
        );
        SetTokenVisibility.validate(&req, &t.state).await.expect("valid");
        let mut draft = t.state.clone();
        SetTokenVisibility
            .execute(&req, &mut draft)
            .await
            .expect("execute");
        assert!(draft.token(t.token).expect("token").hidden);
    }
}
