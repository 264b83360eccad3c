//! Solidity interface of the voting contract
//!
//! Call and return types generated by `sol!`. Each `<name>Call` carries
//! its 4-byte `SELECTOR` and encodes/decodes calldata; `<name>Return`
//! holds the decoded outputs of a getter.

use alloy_sol_types::sol;

sol! {
    // State-changing methods, observed through their transactions.
    function addCandidate(string name, string avatar, string program) external;
    function vote(uint256 candidateIndex) external;
    function startVoting() external;
    function endVoting() external;

    // Public getters.
    function owner() external view returns (address owner);
    function votingOpen() external view returns (bool open);
    function getVotingEndedAt() external view returns (uint256 endedAt);
    function getCandidateCount() external view returns (uint256 count);
    function candidates(uint256 index)
        external
        view
        returns (string name, uint256 voteCount, string avatar, string program);
    function getWinner() external view returns (string name, uint256 voteCount);
}
